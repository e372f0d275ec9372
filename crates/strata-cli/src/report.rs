//! Rendering of transition results

use serde_json::{json, Value};
use strata_scheduler::{Receipt, TransitionResult};

/// Outcome label of a receipt
fn status(receipt: &Receipt) -> &'static str {
    if receipt.consensus_error.is_some() {
        "rejected"
    } else if receipt.success {
        "success"
    } else {
        "failed"
    }
}

fn error(receipt: &Receipt) -> Option<String> {
    receipt
        .consensus_error
        .as_ref()
        .map(ToString::to_string)
        .or_else(|| receipt.error.as_ref().map(ToString::to_string))
}

fn receipt_json(receipt: &Receipt) -> Value {
    json!({
        "index": receipt.index,
        "status": status(receipt),
        "gasUsed": receipt.gas_used,
        "cumulativeGasUsed": receipt.cumulative_gas_used,
        "contractAddress": receipt.contract_address.map(|a| a.to_hex()),
        "logs": receipt.logs.iter().map(|log| json!({
            "address": log.address.to_hex(),
            "topics": log.topics.iter().map(|t| t.to_hex()).collect::<Vec<_>>(),
            "data": format!("0x{}", hex::encode(&log.data)),
        })).collect::<Vec<_>>(),
        "returnData": format!("0x{}", hex::encode(&receipt.return_data)),
        "error": error(receipt),
    })
}

/// JSON document for a transition
pub fn to_json(result: &TransitionResult) -> Value {
    json!({
        "stateRoot": result.state_root.to_hex(),
        "gasUsed": result.receipts.last().map_or(0, |r| r.cumulative_gas_used),
        "partition": {
            "parallel": result.partition.parallel,
            "sequential": result.partition.sequential,
        },
        "replays": result.replays,
        "receipts": result.receipts.iter().map(receipt_json).collect::<Vec<_>>(),
    })
}

/// Human readable summary, one line per transaction
pub fn to_text(result: &TransitionResult) -> String {
    let mut lines = Vec::with_capacity(result.receipts.len() + 4);
    for receipt in &result.receipts {
        let mut line = format!(
            "tx {:>4}  {:<8}  gas {:>10}  cumulative {:>10}",
            receipt.index,
            status(receipt),
            receipt.gas_used,
            receipt.cumulative_gas_used
        );
        if let Some(address) = receipt.contract_address {
            line.push_str(&format!("  created {}", address.to_hex()));
        }
        if !receipt.logs.is_empty() {
            line.push_str(&format!("  logs {}", receipt.logs.len()));
        }
        if let Some(err) = error(receipt) {
            line.push_str(&format!("  ({})", err));
        }
        lines.push(line);
    }
    lines.push(format!(
        "partition: {} parallel, {} sequential, {} replays",
        result.partition.parallel.len(),
        result.partition.sequential.len(),
        result.replays
    ));
    lines.push(format!("state root: {}", result.state_root.to_hex()));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_primitives::{Address, H256};
    use strata_scheduler::Partition;
    use strata_state::InMemoryState;

    fn result() -> TransitionResult {
        let receipt = |index: usize, success: bool, gas_used: u64, cumulative: u64| Receipt {
            index,
            success,
            gas_used,
            cumulative_gas_used: cumulative,
            logs: Vec::new(),
            contract_address: None,
            return_data: Vec::new(),
            error: None,
            consensus_error: None,
        };
        let mut created = receipt(1, true, 53_006, 74_006);
        created.contract_address = Some(Address::from_low_u64_be(0xc0de));
        TransitionResult {
            state: InMemoryState::new(),
            state_root: H256::from_low_u64_be(0xabcd),
            receipts: vec![receipt(0, true, 21_000, 21_000), created],
            partition: Partition {
                parallel: vec![1],
                sequential: vec![0],
            },
            replays: 1,
        }
    }

    #[test]
    fn test_json_report() {
        let value = to_json(&result());
        assert_eq!(value["gasUsed"], 74_006);
        assert_eq!(value["partition"]["parallel"], json!([1]));
        assert_eq!(value["receipts"][0]["status"], "success");
        assert_eq!(value["receipts"][1]["contractAddress"], Address::from_low_u64_be(0xc0de).to_hex());
        assert!(value["receipts"][0]["error"].is_null());
    }

    #[test]
    fn test_text_report() {
        let text = to_text(&result());
        assert!(text.contains("created 0x000000000000000000000000000000000000c0de"));
        assert!(text.contains("1 parallel, 1 sequential, 1 replays"));
        assert!(text.ends_with(&H256::from_low_u64_be(0xabcd).to_hex()));
    }
}
