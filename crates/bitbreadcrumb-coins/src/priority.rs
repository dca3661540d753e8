use bitcoin::Transaction;

/// Bytes of an input that are not charged against its priority.
const INPUT_BASE_SIZE: usize = 41;

/// Signature script bytes per input that are not charged against its priority.
const MAX_FREE_SCRIPT_SIG_SIZE: usize = 110;

/// Serialized size of `tx` without the per-input allowance.
///
/// Each input takes off its outpoint, sequence and script length prefix plus
/// up to 110 bytes of signature script.
pub fn modified_size(tx: &Transaction) -> usize {
    let mut size = tx.base_size();
    for input in &tx.input {
        let offset = INPUT_BASE_SIZE + input.script_sig.len().min(MAX_FREE_SCRIPT_SIG_SIZE);
        if size > offset {
            size -= offset;
        }
    }
    size
}

/// Normalises the summed input priority of `tx` by its modified size.
pub fn compute_priority(tx: &Transaction, input_priority: f64) -> f64 {
    match modified_size(tx) {
        0 => 0.0,
        size => input_priority / size as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::absolute::LockTime;
    use bitcoin::transaction::Version;
    use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, TxIn, TxOut, Witness};

    fn tx(script_sig_len: usize) -> Transaction {
        Transaction {
            version: Version::ONE,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::null(),
                script_sig: ScriptBuf::from_bytes(vec![0x51; script_sig_len]),
                sequence: Sequence::MAX,
                witness: Witness::default(),
            }],
            output: vec![TxOut {
                value: Amount::from_sat(1),
                script_pubkey: ScriptBuf::from_bytes(vec![0x51]),
            }],
        }
    }

    #[test]
    fn test_modified_size_discounts_inputs() {
        // version 4, input count 1, input 41 + 10, output count 1, output 10, lock time 4
        let small = tx(10);
        assert_eq!(small.base_size(), 71);
        assert_eq!(modified_size(&small), 71 - 51);

        // Script sig allowance is capped at 110 bytes.
        let large = tx(200);
        assert_eq!(modified_size(&large), large.base_size() - (41 + 110));
    }

    #[test]
    fn test_compute_priority() {
        let tx = tx(10);
        assert_eq!(compute_priority(&tx, 2000.0), 100.0);
    }
}
