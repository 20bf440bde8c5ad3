//! Integration tests: label table file, storage and report with a temp DB.

use dapp_gas::attribution;
use dapp_gas::config::SourceMode;
use dapp_gas::labeler;
use dapp_gas::labels::{LabelTable, LabelWriter};
use dapp_gas::model::{AddressLabel, TransactionGasRecord, SIMPLE_TRANSFER_GAS};
use dapp_gas::report;
use dapp_gas::storage;

fn sample_labels() -> LabelTable {
    LabelTable::from_labels(vec![
        AddressLabel::new("0xAA", "Uniswap V3", "Uniswap V3: Router"),
        AddressLabel::new("0xcc", "Lido", "Lido: stETH"),
    ])
}

fn sample_attribution(block_number: u64) -> dapp_gas::model::BlockAttribution {
    let records = vec![
        TransactionGasRecord::new(Some("0xaa"), 120_000),
        TransactionGasRecord::new(Some("0xAA"), 80_000),
        TransactionGasRecord::new(Some("0xcc"), 60_000),
        TransactionGasRecord::new(Some("0xdd"), 21_000),
        TransactionGasRecord::new(None, 500_000),
    ];
    attribution::attribute(
        block_number,
        records.len() as u64,
        1_000_000,
        Some(20_000_000_000),
        &records,
        &sample_labels(),
        SIMPLE_TRANSFER_GAS,
    )
    .unwrap()
    .unwrap()
}

#[test]
fn label_table_append_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("labels.csv");
    {
        let mut writer = LabelWriter::open(&path).unwrap();
        writer
            .append(&AddressLabel::new("0xAB", "Curve.fi", "Curve.fi: 3pool"))
            .unwrap();
    }
    {
        // Reopening must not write a second header.
        let mut writer = LabelWriter::open(&path).unwrap();
        writer
            .append(&AddressLabel::new("0xab", "Dup", "Dup"))
            .unwrap();
        writer
            .append(&AddressLabel::new("0xcd", "Unknown", "Unknown"))
            .unwrap();
    }
    let data = std::fs::read_to_string(&path).unwrap();
    assert!(data.starts_with("dapp,contract,address\n"));
    assert_eq!(data.matches("dapp,contract,address").count(), 1);

    let table = LabelTable::load(&path).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.get("0xAB").unwrap().dapp, "Curve.fi");
    assert!(table.contains("0xcd"));
}

#[test]
fn label_table_append_after_unterminated_row() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("labels.csv");
    std::fs::write(&path, "dapp,contract,address\nFoo,Foo,0xaa").unwrap();
    {
        let mut writer = LabelWriter::open(&path).unwrap();
        writer
            .append(&AddressLabel::new("0xbb", "Bar", "Bar"))
            .unwrap();
    }
    let data = std::fs::read_to_string(&path).unwrap();
    assert_eq!(data, "dapp,contract,address\nFoo,Foo,0xaa\nBar,Bar,0xbb\n");

    let table = LabelTable::load(&path).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.get("0xaa").unwrap().dapp, "Foo");
    assert_eq!(table.get("0xbb").unwrap().dapp, "Bar");
}

#[test]
fn label_table_round_trips_classified_titles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("labels.csv");
    let (dapp, contract) = labeler::classify_title(Some(" Lido : stETH | Address 0xae7a | Etherscan"));
    let written = AddressLabel::new("0xae7a", dapp, contract);
    LabelWriter::open(&path).unwrap().append(&written).unwrap();

    let table = LabelTable::load(&path).unwrap();
    assert_eq!(table.get("0xae7a"), Some(&written));
    assert_eq!(written.dapp, " Lido ");
    assert_eq!(written.contract, "Lido : stETH");
}

#[test]
fn label_table_missing_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let table = LabelTable::load(&dir.path().join("absent.csv")).unwrap();
    assert!(table.is_empty());
}

#[test]
fn label_table_normalizes_hand_written_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("labels.csv");
    std::fs::write(
        &path,
        "dapp,contract,address\nFoo, Foo Router ,0xABCDEF\nBar,Bar,0xabcdef\n",
    )
    .unwrap();
    let table = LabelTable::load(&path).unwrap();
    assert_eq!(table.len(), 1);
    let label = table.get("0xabcdef").unwrap();
    assert_eq!(label.dapp, "Foo");
    assert_eq!(label.contract, "Foo Router");
    assert_eq!(label.address, "0xabcdef");
}

#[test]
fn attribution_buckets() {
    let a = sample_attribution(1);
    assert_eq!(a.tx_count, 5);
    assert_eq!(a.by_address[0].to, "contract creation");
    assert_eq!(a.by_dapp[0].dapp, "Uniswap V3");
    assert_eq!(a.by_dapp[0].gas_used, 200_000);
    assert_eq!(a.by_dapp[0].count, 2);
    assert_eq!(a.coverage.dapp_gas, 260_000);
    assert_eq!(a.coverage.simple_transfer_gas, 21_000);
    assert_eq!(a.coverage.unattributed_gas(), 1_000_000 - 281_000);
}

#[test]
fn storage_save_and_get_attribution() {
    let dir = tempfile::tempdir().unwrap();
    let mut conn = storage::open_db(&dir.path().join("test.db")).unwrap();
    let a = sample_attribution(100);
    storage::save_attribution(&mut conn, &a, SourceMode::Receipt).unwrap();
    // Saving again replaces rather than duplicates.
    storage::save_attribution(&mut conn, &a, SourceMode::Receipt).unwrap();

    let stored = storage::get_attribution(&conn, 100).unwrap().unwrap();
    assert_eq!(stored.mode, "receipt");
    assert_eq!(stored.tx_count, 5);
    assert_eq!(stored.dapp_gas, 260_000);
    assert_eq!(stored.base_fee_per_gas, Some(20_000_000_000));

    let dapps = storage::get_dapp_gas(&conn, 100).unwrap();
    assert_eq!(dapps, a.by_dapp);
    assert!(storage::get_attribution(&conn, 101).unwrap().is_none());
}

#[test]
fn storage_range_totals() {
    let dir = tempfile::tempdir().unwrap();
    let mut conn = storage::open_db(&dir.path().join("test.db")).unwrap();
    for n in [10, 11, 12] {
        storage::save_attribution(&mut conn, &sample_attribution(n), SourceMode::Trace).unwrap();
    }
    assert_eq!(storage::block_numbers_in_range(&conn, 10, 12).unwrap(), vec![10, 11]);
    let totals = storage::coverage_totals_in_range(&conn, 10, 13).unwrap();
    assert_eq!(totals.blocks, 3);
    assert_eq!(totals.total_gas, 3_000_000);
    let dapps = storage::dapp_totals_in_range(&conn, 10, 13).unwrap();
    assert_eq!(dapps[0].dapp, "Uniswap V3");
    assert_eq!(dapps[0].gas_used, 600_000);
    assert_eq!(dapps[0].count, 6);
}

#[test]
fn report_range_summary_empty_db() {
    let dir = tempfile::tempdir().unwrap();
    let conn = storage::open_db(&dir.path().join("test.db")).unwrap();
    let out = report::render_range_summary(&conn, 0, 100).unwrap();
    assert_eq!(out, "No saved blocks in range.\n");
}

#[test]
fn report_renders_attribution() {
    let a = sample_attribution(42);
    let out = report::render_attribution(&a, &sample_labels(), 3);
    assert!(out.contains("--- Block 42 ---"));
    assert!(out.contains("n_txs: 5"));
    assert!(out.contains("Uniswap V3: Router"));
    assert!(out.contains("simple transfers: 2.10%"));
    assert!(out.contains("dapps: 26.00%"));
    assert!(out.contains("combined: 28.10%"));
    assert!(out.contains("burned: 20000000.000 gwei total"));
}
