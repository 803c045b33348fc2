//! EIP-7685 execution-requests translation. `spec.md` §4.H step 5: "translate execution
//! requests from EIP-7685 type-prefixed SSZ to `{deposits[], withdrawals[], consolidations[]}`
//! by fixed per-type record sizes (deposit 192B, withdrawal 76B, consolidation 116B)."

use thiserror::Error;

const DEPOSIT_REQUEST_TYPE: u8 = 0x00;
const WITHDRAWAL_REQUEST_TYPE: u8 = 0x01;
const CONSOLIDATION_REQUEST_TYPE: u8 = 0x02;

const DEPOSIT_RECORD_SIZE: usize = 192;
const WITHDRAWAL_RECORD_SIZE: usize = 76;
const CONSOLIDATION_RECORD_SIZE: usize = 116;

#[derive(Debug, Error)]
pub enum Error {
    #[error("empty execution request entry")]
    Empty,
    #[error("unknown execution request type {0:#x}")]
    UnknownType(u8),
    #[error("request type {kind:#x} body length {len} is not a multiple of its record size {record_size}")]
    Misaligned { kind: u8, len: usize, record_size: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayExecutionRequests {
    pub deposits: Vec<Vec<u8>>,
    pub withdrawals: Vec<Vec<u8>>,
    pub consolidations: Vec<Vec<u8>>,
}

/// Splits each type-prefixed byte string into fixed-size records of the matching type.
pub fn translate(execution_requests: &[Vec<u8>]) -> Result<RelayExecutionRequests, Error> {
    let mut out = RelayExecutionRequests::default();
    for entry in execution_requests {
        let (&kind, body) = entry.split_first().ok_or(Error::Empty)?;
        let (records, record_size) = match kind {
            DEPOSIT_REQUEST_TYPE => (&mut out.deposits, DEPOSIT_RECORD_SIZE),
            WITHDRAWAL_REQUEST_TYPE => (&mut out.withdrawals, WITHDRAWAL_RECORD_SIZE),
            CONSOLIDATION_REQUEST_TYPE => (&mut out.consolidations, CONSOLIDATION_RECORD_SIZE),
            other => return Err(Error::UnknownType(other)),
        };
        if body.len() % record_size != 0 {
            return Err(Error::Misaligned { kind, len: body.len(), record_size });
        }
        for chunk in body.chunks(record_size) {
            records.push(chunk.to_vec());
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_a_deposit_entry_into_fixed_size_records() {
        let mut entry = vec![DEPOSIT_REQUEST_TYPE];
        entry.extend(vec![0xaa; DEPOSIT_RECORD_SIZE * 2]);
        let translated = translate(&[entry]).unwrap();
        assert_eq!(translated.deposits.len(), 2);
        assert!(translated.withdrawals.is_empty());
    }

    #[test]
    fn rejects_misaligned_bodies() {
        let entry = vec![WITHDRAWAL_REQUEST_TYPE, 0x01, 0x02];
        assert!(matches!(translate(&[entry]), Err(Error::Misaligned { .. })));
    }

    #[test]
    fn rejects_unknown_type_prefix() {
        let entry = vec![0x09, 0x01];
        assert!(matches!(translate(&[entry]), Err(Error::UnknownType(0x09))));
    }

    #[test]
    fn empty_list_yields_empty_sets() {
        let translated = translate(&[]).unwrap();
        assert_eq!(translated, RelayExecutionRequests::default());
    }
}
