//! Gas attribution: group by destination, join labels, regroup by dapp, compute coverage.

use crate::error::AttributionError;
use crate::labels::LabelTable;
use crate::model::{
    normalize_address, AddressGasAggregate, BlockAttribution, Coverage, DappGasAggregate,
    LabeledAggregate, Ratio, TransactionGasRecord,
};
use std::collections::HashMap;

/// Sum gas and count transactions per normalized destination.
/// Output is sorted by gas used (descending), then address.
pub fn group_by_address(records: &[TransactionGasRecord]) -> Vec<AddressGasAggregate> {
    let mut acc: HashMap<String, (u64, u64)> = HashMap::new();
    for r in records {
        let entry = acc.entry(normalize_address(&r.to)).or_insert((0, 0));
        entry.0 += r.gas_used;
        entry.1 += 1;
    }
    let mut out: Vec<AddressGasAggregate> = acc
        .into_iter()
        .map(|(to, (gas_used, count))| AddressGasAggregate { to, gas_used, count })
        .collect();
    out.sort_by(|a, b| b.gas_used.cmp(&a.gas_used).then_with(|| a.to.cmp(&b.to)));
    out
}

/// Inner join of address aggregates against labels that name a dapp.
pub fn join_labels(
    aggregates: &[AddressGasAggregate],
    labels: &LabelTable,
) -> Vec<LabeledAggregate> {
    aggregates
        .iter()
        .filter_map(|agg| {
            labels.dapp_for(&agg.to).map(|label| LabeledAggregate {
                to: agg.to.clone(),
                dapp: label.dapp.clone(),
                contract: label.contract.clone(),
                gas_used: agg.gas_used,
                count: agg.count,
            })
        })
        .collect()
}

/// Regroup joined rows by dapp. Sorted by gas used (descending), then name.
pub fn group_by_dapp(joined: &[LabeledAggregate]) -> Vec<DappGasAggregate> {
    let mut acc: HashMap<&str, (u64, u64)> = HashMap::new();
    for row in joined {
        let entry = acc.entry(row.dapp.as_str()).or_insert((0, 0));
        entry.0 += row.gas_used;
        entry.1 += row.count;
    }
    let mut out: Vec<DappGasAggregate> = acc
        .into_iter()
        .map(|(dapp, (gas_used, count))| DappGasAggregate {
            dapp: dapp.to_string(),
            gas_used,
            count,
        })
        .collect();
    out.sort_by(|a, b| b.gas_used.cmp(&a.gas_used).then_with(|| a.dapp.cmp(&b.dapp)));
    out
}

/// Whether a transaction counts as a plain value transfer.
///
/// Transactions to an address labeled with a dapp stay in the dapp bucket, so
/// the two buckets never share gas.
pub fn is_simple_transfer(record: &TransactionGasRecord, labels: &LabelTable, base_cost: u64) -> bool {
    record.gas_used == base_cost
        && !record.is_contract_creation()
        && labels.dapp_for(&record.to).is_none()
}

/// Total gas and count of simple transfers.
pub fn simple_transfer_gas(
    records: &[TransactionGasRecord],
    labels: &LabelTable,
    base_cost: u64,
) -> (u64, u64) {
    records
        .iter()
        .filter(|r| is_simple_transfer(r, labels, base_cost))
        .fold((0, 0), |(gas, count), r| (gas + r.gas_used, count + 1))
}

impl Coverage {
    /// Ratios of each bucket against the block's gas used.
    pub fn compute(
        total_gas: u64,
        simple_transfer_gas: u64,
        dapp_gas: u64,
    ) -> Result<Coverage, AttributionError> {
        let attributed = simple_transfer_gas + dapp_gas;
        if attributed > total_gas {
            return Err(AttributionError::GasExceedsTotal {
                attributed,
                total: total_gas,
            });
        }
        Ok(Coverage {
            total_gas,
            simple_transfer_gas,
            dapp_gas,
            simple_transfer: Ratio::of(simple_transfer_gas, total_gas),
            dapp: Ratio::of(dapp_gas, total_gas),
            combined: Ratio::of(attributed, total_gas),
        })
    }
}

/// Attribute one block's transactions. `Ok(None)` when there are no records.
pub fn attribute(
    block_number: u64,
    tx_count: u64,
    total_gas: u64,
    base_fee_per_gas: Option<u64>,
    records: &[TransactionGasRecord],
    labels: &LabelTable,
    base_cost: u64,
) -> Result<Option<BlockAttribution>, AttributionError> {
    if records.is_empty() {
        return Ok(None);
    }
    let by_address = group_by_address(records);
    let joined = join_labels(&by_address, labels);
    let by_dapp = group_by_dapp(&joined);
    let dapp_gas: u64 = by_dapp.iter().map(|d| d.gas_used).sum();
    let (transfer_gas, transfer_count) = simple_transfer_gas(records, labels, base_cost);
    let coverage = Coverage::compute(total_gas, transfer_gas, dapp_gas)?;
    Ok(Some(BlockAttribution {
        block_number,
        tx_count,
        record_count: records.len() as u64,
        base_fee_per_gas,
        by_address,
        by_dapp,
        simple_transfer_count: transfer_count,
        coverage,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AddressLabel, SIMPLE_TRANSFER_GAS};

    fn rec(to: &str, gas: u64) -> TransactionGasRecord {
        TransactionGasRecord::new(Some(to), gas)
    }

    fn example() -> (Vec<TransactionGasRecord>, LabelTable) {
        let records = vec![rec("0xaa", 21_000), rec("0xaa", 50_000), rec("0xbb", 21_000)];
        let labels = LabelTable::from_labels(vec![AddressLabel::new("0xaa", "Foo", "Foo Router")]);
        (records, labels)
    }

    #[test]
    fn test_group_by_address_example() {
        let (records, _) = example();
        let agg = group_by_address(&records);
        assert_eq!(
            agg,
            vec![
                AddressGasAggregate { to: "0xaa".into(), gas_used: 71_000, count: 2 },
                AddressGasAggregate { to: "0xbb".into(), gas_used: 21_000, count: 1 },
            ]
        );
    }

    #[test]
    fn test_group_by_dapp_example() {
        let (records, labels) = example();
        let joined = join_labels(&group_by_address(&records), &labels);
        assert_eq!(
            group_by_dapp(&joined),
            vec![DappGasAggregate { dapp: "Foo".into(), gas_used: 71_000, count: 2 }]
        );
    }

    #[test]
    fn test_simple_transfer_excludes_labeled_destinations() {
        let (records, labels) = example();
        assert_eq!(
            simple_transfer_gas(&records, &labels, SIMPLE_TRANSFER_GAS),
            (21_000, 1)
        );
    }

    #[test]
    fn test_contract_creation_is_never_a_transfer() {
        let records = vec![TransactionGasRecord::contract_creation(21_000)];
        let labels = LabelTable::new();
        assert_eq!(simple_transfer_gas(&records, &labels, SIMPLE_TRANSFER_GAS), (0, 0));
    }

    #[test]
    fn test_join_is_case_insensitive() {
        let labels = LabelTable::from_labels(vec![AddressLabel::new("0xABC", "Bar", "Bar")]);
        let agg = group_by_address(&[rec("0xabc", 100)]);
        let joined = join_labels(&agg, &labels);
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].dapp, "Bar");
    }

    #[test]
    fn test_grouping_preserves_sum() {
        let records: Vec<_> = (0..50u64)
            .map(|i| rec(&format!("0x{:02x}", i % 7), 1_000 + i * 37))
            .chain(std::iter::once(TransactionGasRecord::contract_creation(99_999)))
            .collect();
        let input: u64 = records.iter().map(|r| r.gas_used).sum();
        let output: u64 = group_by_address(&records).iter().map(|a| a.gas_used).sum();
        let count: u64 = group_by_address(&records).iter().map(|a| a.count).sum();
        assert_eq!(input, output);
        assert_eq!(count, records.len() as u64);
    }

    #[test]
    fn test_attribute_example() {
        let (records, labels) = example();
        let result = attribute(7, 3, 100_000, Some(10), &records, &labels, SIMPLE_TRANSFER_GAS)
            .unwrap()
            .unwrap();
        assert_eq!(result.tx_count, 3);
        assert_eq!(result.coverage.dapp_gas, 71_000);
        assert_eq!(result.coverage.simple_transfer_gas, 21_000);
        assert_eq!(result.coverage.attributed_gas(), 92_000);
        assert_eq!(result.coverage.unattributed_gas(), 8_000);
        assert_eq!(result.coverage.combined, Ratio::Defined(0.92));
        assert_eq!(result.burned_wei(71_000), Some(710_000));
    }

    #[test]
    fn test_attribute_empty_is_sentinel() {
        let labels = LabelTable::new();
        assert_eq!(attribute(1, 0, 0, None, &[], &labels, SIMPLE_TRANSFER_GAS), Ok(None));
    }

    #[test]
    fn test_coverage_zero_total() {
        let c = Coverage::compute(0, 0, 0).unwrap();
        assert_eq!(c.combined, Ratio::Undefined);
        assert_eq!(c.dapp, Ratio::Undefined);
    }

    #[test]
    fn test_coverage_in_unit_interval() {
        for (total, simple, dapp) in [(1u64, 0u64, 1u64), (30_000_000, 21_000, 1_000_000), (5, 5, 0)] {
            let c = Coverage::compute(total, simple, dapp).unwrap();
            for r in [c.simple_transfer, c.dapp, c.combined] {
                let v = r.value().unwrap();
                assert!((0.0..=1.0).contains(&v), "{} out of range", v);
            }
        }
    }

    #[test]
    fn test_coverage_rejects_excess() {
        assert_eq!(
            Coverage::compute(10, 6, 6),
            Err(AttributionError::GasExceedsTotal { attributed: 12, total: 10 })
        );
        assert!(Coverage::compute(0, 1, 0).is_err());
    }
}
