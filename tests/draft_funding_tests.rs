//! Draft construction against in-memory storage: fees, change, sweeps and
//! release of reservations on failure

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::{external_address, Harness, OWNER};
use lightweight_beef_wallet::{
    data_structures::{
        script::p2pkh_locking_script, ChangeStrategy, OpReturn, ScriptOutput, ScriptType,
        Transaction, TransactionConfig, TransactionOutput,
    },
    resolver::DestinationResolver,
    storage::{MemoryFailureModes, WalletStorage},
    FeeUnit, WalletError, WalletResult,
};

/// Pays every destination through two P2PKH scripts
struct FanOutResolver {
    /// Fixed amounts per script; `None` splits the requested amount evenly
    fixed: Option<[u64; 2]>,
}

#[async_trait]
impl DestinationResolver for FanOutResolver {
    async fn resolve(&self, to: &str, satoshis: u64) -> WalletResult<Vec<ScriptOutput>> {
        let amounts = self
            .fixed
            .unwrap_or([satoshis / 2, satoshis - satoshis / 2]);
        Ok(amounts
            .iter()
            .enumerate()
            .map(|(i, amount)| ScriptOutput {
                address: to.to_string(),
                satoshis: *amount,
                script: hex::encode(p2pkh_locking_script(&[0x70 + i as u8; 20])),
                script_type: ScriptType::PubKeyHash,
            })
            .collect())
    }
}

#[tokio::test]
async fn test_single_output_with_change() {
    let h = Harness::new(FeeUnit::new(5, 100));
    let utxo = h.fund(OWNER, 1, 100_000).await;

    let config = TransactionConfig::new()
        .with_output(TransactionOutput::to_address(external_address(9), 1000));
    let draft = h.engine.create_draft(OWNER, config).await.unwrap();

    let cfg = &draft.configuration;
    assert_eq!(cfg.inputs.len(), 1);
    assert_eq!(cfg.inputs[0].utxo.id, utxo.id);
    assert_eq!(cfg.outputs.len(), 2);
    assert_eq!(cfg.fee, 12);
    assert_eq!(cfg.change_satoshis, 98_988);
    assert_eq!(cfg.outputs[1].satoshis, 98_988);
    assert_eq!(cfg.change_destinations.len(), 1);

    let tx = Transaction::from_hex(&draft.hex).unwrap();
    assert_eq!(tx.inputs.len(), 1);
    assert!(tx.inputs[0].unlocking_script.is_empty());
    assert_eq!(tx.outputs.len(), 2);
    assert_eq!(tx.total_output_satoshis() + cfg.fee, 100_000);

    let reserved = h.reserved(OWNER).await;
    assert_eq!(reserved.len(), 1);
    assert_eq!(reserved[0].draft_id.as_deref(), Some(draft.id.as_str()));
    assert!(h.event_types().await.contains(&"DraftCreated"));
}

#[tokio::test]
async fn test_fan_out_output_pays_exactly_the_fee() {
    let h = Harness::with_resolver(FeeUnit::new(5, 100), Arc::new(FanOutResolver { fixed: None }));
    h.fund(OWNER, 1, 100_000).await;

    let config = TransactionConfig::new().with_output(TransactionOutput::to_address("carol", 1001));
    let draft = h.engine.create_draft(OWNER, config).await.unwrap();
    let cfg = &draft.configuration;
    assert_eq!(cfg.outputs[0].scripts.len(), 2);

    let tx = Transaction::from_hex(&draft.hex).unwrap();
    assert_eq!(tx.outputs.len(), 3);
    assert_eq!(tx.outputs[0].satoshis + tx.outputs[1].satoshis, 1001);
    assert_eq!(tx.total_output_satoshis() + cfg.fee, 100_000);
    assert_eq!(cfg.change_satoshis, tx.outputs[2].satoshis);
}

#[tokio::test]
async fn test_resolver_amount_mismatch_rejected() {
    let h = Harness::with_resolver(
        FeeUnit::new(5, 100),
        Arc::new(FanOutResolver {
            fixed: Some([600, 600]),
        }),
    );
    h.fund(OWNER, 1, 100_000).await;

    let config = TransactionConfig::new().with_output(TransactionOutput::to_address("carol", 1000));
    let err = h.engine.create_draft(OWNER, config).await.unwrap_err();
    assert!(matches!(err, WalletError::InvalidDestination(_)));
    assert!(h.reserved(OWNER).await.is_empty());
}

#[tokio::test]
async fn test_sweep_spends_everything() {
    let h = Harness::new(FeeUnit::new(1, 20));
    for seed in 1..=4 {
        h.fund(OWNER, seed, 122_500).await;
    }

    let config = TransactionConfig::new()
        .with_send_all_to(TransactionOutput::to_address(external_address(9), 0));
    let draft = h.engine.create_draft(OWNER, config).await.unwrap();

    let cfg = &draft.configuration;
    assert_eq!(cfg.inputs.len(), 4);
    assert_eq!(cfg.fee, 32);
    assert_eq!(cfg.outputs.len(), 1);
    assert_eq!(cfg.outputs[0].satoshis, 489_968);
    assert!(cfg.change_destinations.is_empty());
    assert_eq!(h.reserved(OWNER).await.len(), 4);
}

#[tokio::test]
async fn test_sweep_with_extra_output() {
    let h = Harness::new(FeeUnit::new(1, 20));
    h.fund(OWNER, 1, 50_000).await;

    let config = TransactionConfig::new()
        .with_output(TransactionOutput::to_address(external_address(8), 10_000))
        .with_send_all_to(TransactionOutput::to_address(external_address(9), 0));
    let draft = h.engine.create_draft(OWNER, config).await.unwrap();

    let cfg = &draft.configuration;
    assert_eq!(cfg.outputs.len(), 2);
    assert_eq!(cfg.outputs[1].satoshis, 10_000);
    assert_eq!(cfg.outputs[0].satoshis + 10_000 + cfg.fee, 50_000);
}

#[tokio::test]
async fn test_insufficient_funds_reserves_nothing() {
    let h = Harness::new(FeeUnit::new(1, 20));
    h.fund(OWNER, 1, 500).await;

    let config = TransactionConfig::new()
        .with_output(TransactionOutput::to_address(external_address(9), 1000));
    let err = h.engine.create_draft(OWNER, config).await.unwrap_err();

    assert!(matches!(err, WalletError::InsufficientFunds(_)));
    assert!(h.reserved(OWNER).await.is_empty());
}

#[tokio::test]
async fn test_reservation_target_counts_overhead_once() {
    // At 1 sat/byte one input and one output cost 192; 195 is left over
    let h = Harness::new(FeeUnit::new(1, 1));
    h.fund(OWNER, 1, 10_000).await;

    let config = TransactionConfig::new()
        .with_output(TransactionOutput::to_address(external_address(9), 9_805));
    let draft = h.engine.create_draft(OWNER, config).await.unwrap();

    // Too little for a change output, so the fee absorbs it
    assert_eq!(draft.configuration.fee, 195);
    assert_eq!(draft.configuration.outputs.len(), 1);
    let tx = Transaction::from_hex(&draft.hex).unwrap();
    assert_eq!(tx.total_output_satoshis() + draft.configuration.fee, 10_000);
}

#[tokio::test]
async fn test_failed_persist_releases_reservations() {
    let h = Harness::new(FeeUnit::new(1, 20));
    h.fund(OWNER, 1, 20_000).await;
    h.fund(OWNER, 2, 20_000).await;
    h.storage.set_failure_mode(MemoryFailureModes {
        fail_save_draft: true,
        ..Default::default()
    });

    let config = TransactionConfig::new()
        .with_output(TransactionOutput::to_address(external_address(9), 30_000));
    let err = h.engine.create_draft(OWNER, config).await.unwrap_err();

    assert!(matches!(err, WalletError::StorageError(_)));
    assert!(h.reserved(OWNER).await.is_empty());
    let types = h.event_types().await;
    assert!(types.contains(&"UtxosReserved"));
    assert!(types.contains(&"UtxosReleased"));
    assert!(!types.contains(&"DraftCreated"));
}

#[tokio::test]
async fn test_unknown_input_script_fails_and_releases() {
    let h = Harness::new(FeeUnit::new(1, 20));
    let utxo = h.fund(OWNER, 1, 20_000).await;
    // Same script, different owner: the destination lookup is per owner
    let mut stray = utxo.clone();
    stray.owner_id = "bob".to_string();
    stray.id = "stray".to_string();
    h.storage.save_utxo(&stray).await.unwrap();

    let config = TransactionConfig::new()
        .with_output(TransactionOutput::to_address(external_address(9), 1000));
    let err = h.engine.create_draft("bob", config).await.unwrap_err();

    assert!(matches!(err, WalletError::MissingDestination(_)));
    assert!(h.reserved("bob").await.is_empty());
}

#[tokio::test]
async fn test_op_return_output() {
    let h = Harness::new(FeeUnit::new(1, 20));
    h.fund(OWNER, 1, 5_000).await;

    let op_return = OpReturn {
        string_parts: vec!["hello".to_string()],
        ..Default::default()
    };
    let config = TransactionConfig::new().with_output(TransactionOutput::op_return(op_return));
    let draft = h.engine.create_draft(OWNER, config).await.unwrap();

    let cfg = &draft.configuration;
    assert_eq!(cfg.outputs[0].scripts[0].script_type, ScriptType::NullData);
    assert_eq!(cfg.outputs[0].scripts[0].satoshis, 0);
    let tx = Transaction::from_hex(&draft.hex).unwrap();
    assert_eq!(tx.outputs[0].satoshis, 0);
}

#[tokio::test]
async fn test_op_return_with_value_rejected_before_reserving() {
    let h = Harness::new(FeeUnit::new(1, 20));
    h.fund(OWNER, 1, 5_000).await;

    let mut output = TransactionOutput::op_return(OpReturn {
        hex: Some("deadbeef".to_string()),
        ..Default::default()
    });
    output.satoshis = 10;
    let err = h
        .engine
        .create_draft(OWNER, TransactionConfig::new().with_output(output))
        .await
        .unwrap_err();

    assert!(matches!(err, WalletError::InvalidOpReturnOutput(_)));
    assert!(h.event_types().await.is_empty());
}

#[tokio::test]
async fn test_validation_errors() {
    let h = Harness::new(FeeUnit::new(1, 20));

    let err = h
        .engine
        .create_draft(OWNER, TransactionConfig::new())
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::MissingTransactionOutputs));

    let err = h
        .engine
        .create_draft(
            OWNER,
            TransactionConfig::new()
                .with_output(TransactionOutput::to_address(external_address(9), 1000))
                .with_fee_unit(FeeUnit::new(1, 0)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::InvalidFeeUnit(_)));

    let err = h
        .engine
        .create_draft(
            OWNER,
            TransactionConfig::new().with_output(TransactionOutput::to_address("bob@example.com", 1000)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::InvalidDestination(_)));
}

#[tokio::test]
async fn test_change_split_across_destinations() {
    let h = Harness::new(FeeUnit::new(1, 20));
    h.fund(OWNER, 1, 100_000).await;

    let config = TransactionConfig::new()
        .with_output(TransactionOutput::to_address(external_address(9), 10_000))
        .with_change_destinations(3, 1000);
    let draft = h.engine.create_draft(OWNER, config).await.unwrap();

    let cfg = &draft.configuration;
    assert_eq!(cfg.change_destinations.len(), 3);
    assert_eq!(cfg.outputs.len(), 4);
    let change: u64 = cfg.outputs[1..].iter().map(|o| o.satoshis).sum();
    assert_eq!(change, cfg.change_satoshis);
    assert_eq!(10_000 + change + cfg.fee, 100_000);
    // Even split, remainder on the last one
    assert!(cfg.outputs[3].satoshis >= cfg.outputs[1].satoshis);
}

#[tokio::test]
async fn test_small_change_collapses_to_one_destination() {
    let h = Harness::new(FeeUnit::new(1, 20));
    h.fund(OWNER, 1, 12_000).await;

    let config = TransactionConfig::new()
        .with_output(TransactionOutput::to_address(external_address(9), 10_000))
        .with_change_destinations(4, 1250);
    let draft = h.engine.create_draft(OWNER, config).await.unwrap();

    assert_eq!(draft.configuration.change_destinations.len(), 1);
    assert_eq!(draft.configuration.outputs.len(), 2);
}

#[tokio::test]
async fn test_random_change_keeps_total() {
    let h = Harness::new(FeeUnit::new(1, 20));
    h.fund(OWNER, 1, 200_000).await;

    let config = TransactionConfig::new()
        .with_output(TransactionOutput::to_address(external_address(9), 10_000))
        .with_change_destinations(4, 1000)
        .with_change_strategy(ChangeStrategy::Random);
    let draft = h.engine.create_draft(OWNER, config).await.unwrap();

    let cfg = &draft.configuration;
    let change: u64 = cfg.outputs[1..].iter().map(|o| o.satoshis).sum();
    assert_eq!(cfg.outputs.len(), 5);
    assert_eq!(change, cfg.change_satoshis);
    assert_eq!(10_000 + change + cfg.fee, 200_000);
}

#[tokio::test]
async fn test_nominations_not_implemented() {
    let h = Harness::new(FeeUnit::new(1, 20));
    h.fund(OWNER, 1, 200_000).await;

    let config = TransactionConfig::new()
        .with_output(TransactionOutput::to_address(external_address(9), 10_000))
        .with_change_strategy(ChangeStrategy::Nominations);
    let err = h.engine.create_draft(OWNER, config).await.unwrap_err();

    assert!(matches!(err, WalletError::NotImplemented(_)));
    assert!(h.reserved(OWNER).await.is_empty());
}

#[tokio::test]
async fn test_use_for_change_output_takes_change() {
    let h = Harness::new(FeeUnit::new(1, 20));
    h.fund(OWNER, 1, 50_000).await;

    let mut keep = TransactionOutput::to_address(external_address(7), 5_000);
    keep.use_for_change = true;
    let config = TransactionConfig::new()
        .with_output(TransactionOutput::to_address(external_address(9), 10_000))
        .with_output(keep);
    let draft = h.engine.create_draft(OWNER, config).await.unwrap();

    let cfg = &draft.configuration;
    assert!(cfg.change_destinations.is_empty());
    assert_eq!(cfg.outputs.len(), 2);
    assert_eq!(cfg.outputs[1].satoshis, 5_000 + cfg.change_satoshis);
    assert_eq!(cfg.outputs[0].satoshis + cfg.outputs[1].satoshis + cfg.fee, 50_000);
}

#[tokio::test]
async fn test_include_utxos_are_always_spent() {
    let h = Harness::new(FeeUnit::new(1, 20));
    h.fund(OWNER, 1, 50_000).await;
    let forced = h.fund(OWNER, 2, 70_000).await;

    let config = TransactionConfig::new()
        .with_output(TransactionOutput::to_address(external_address(9), 1_000))
        .with_include_utxos(vec![forced.pointer()]);
    let draft = h.engine.create_draft(OWNER, config).await.unwrap();

    let ids: Vec<&str> = draft
        .configuration
        .inputs
        .iter()
        .map(|i| i.utxo.id.as_str())
        .collect();
    assert!(ids.contains(&forced.id.as_str()));
}

#[tokio::test]
async fn test_include_with_sweep_rejected() {
    let h = Harness::new(FeeUnit::new(1, 20));
    let utxo = h.fund(OWNER, 1, 50_000).await;

    let config = TransactionConfig::new()
        .with_send_all_to(TransactionOutput::to_address(external_address(9), 0))
        .with_include_utxos(vec![utxo.pointer()]);
    let err = h.engine.create_draft(OWNER, config).await.unwrap_err();
    assert!(matches!(err, WalletError::InvalidConfiguration(_)));
}
