//! Draft transaction construction
//!
//! `validate → resolve outputs → reserve → assemble → change → reconcile →
//! collect proofs → persist`. Output resolution runs before anything is
//! reserved; from the reservation on, any failure releases what the draft
//! holds before the error is returned.

use std::collections::HashSet;

use crate::data_structures::{
    draft_transaction::{
        DraftStatus, DraftTransaction, ScriptOutput, TransactionConfig, TransactionInput,
        TransactionOutput,
    },
    script::{address_from_locking_script, ScriptType},
    transaction::{Transaction, TxInput, TxOutput},
};
use crate::drafts::change::{plan_change, split_change, split_remainder_first, ChangeRequest};
use crate::engine::EngineContext;
use crate::errors::{WalletError, WalletResult};
use crate::events::DraftEvent;
use crate::fees::{estimate_size, output_size, FeeUnit};
use crate::proofs::{group_by_height, merge_bumps};
use crate::reservation::{Reservation, ReservationEngine, ReservationGuard, ReservationRequest};
use crate::utils::{current_timestamp_ms, random_id};

/// Builds, funds and persists drafts
pub struct DraftBuilder<'a> {
    ctx: &'a EngineContext,
    reservations: ReservationEngine,
}

impl<'a> DraftBuilder<'a> {
    pub fn new(ctx: &'a EngineContext) -> Self {
        Self {
            ctx,
            reservations: ctx.reservations(),
        }
    }

    /// Create a funded, unsigned draft for `owner_id`
    pub async fn build(
        &self,
        owner_id: &str,
        configuration: TransactionConfig,
    ) -> WalletResult<DraftTransaction> {
        validate(owner_id, &configuration)?;

        let fee_unit = configuration.fee_unit.unwrap_or(self.ctx.config.fee_unit);
        fee_unit.validate()?;
        let expires_in = configuration
            .expires_in
            .unwrap_or(self.ctx.config.draft_expiry);

        let now = current_timestamp_ms();
        let mut draft = DraftTransaction {
            id: random_id(),
            owner_id: owner_id.to_string(),
            created_at: now,
            expires_at: now + expires_in.as_millis() as u64,
            status: DraftStatus::Draft,
            configuration,
            hex: String::new(),
            bumps: Vec::new(),
            final_tx_id: None,
        };
        draft.configuration.fee_unit = Some(fee_unit);

        self.resolve_outputs(&mut draft.configuration).await?;

        let guard = ReservationGuard::new(self.reservations.clone(), owner_id, &draft.id);
        match self.fund(&mut draft, fee_unit).await {
            Ok(()) => {
                guard.commit();
                tracing::info!(
                    owner = owner_id,
                    draft_id = %draft.id,
                    fee = draft.configuration.fee,
                    inputs = draft.configuration.inputs.len(),
                    "draft created"
                );
                self.ctx
                    .publish(DraftEvent::draft_created(
                        owner_id,
                        &draft.id,
                        draft.configuration.fee,
                        draft.configuration.inputs.len(),
                        draft.configuration.outputs.len(),
                    ))
                    .await;
                Ok(draft)
            }
            Err(e) => {
                tracing::debug!(owner = owner_id, draft_id = %draft.id, error = %e, "draft failed, releasing");
                guard.release().await;
                Err(e)
            }
        }
    }

    async fn fund(&self, draft: &mut DraftTransaction, fee_unit: FeeUnit) -> WalletResult<()> {
        let sweep = draft.configuration.send_all_to.is_some();
        let reservation = if sweep {
            self.reservations
                .reserve_all(
                    &draft.owner_id,
                    &draft.id,
                    ScriptType::PubKeyHash,
                    &draft.configuration.from_utxos,
                )
                .await?
        } else {
            self.reserve_for_outputs(draft, fee_unit).await?
        };
        tracing::debug!(
            draft_id = %draft.id,
            utxos = reservation.selected.len() + reservation.included.len(),
            satoshis = reservation.total_satoshis(),
            "funding reserved"
        );

        self.attach_inputs(draft, &reservation).await?;

        if sweep {
            apply_sweep(&mut draft.configuration, fee_unit, self.ctx.config.dust_limit)?;
        } else {
            self.apply_change(draft, fee_unit).await?;
        }

        let tx = assemble(&draft.configuration)?;
        reconcile(&draft.configuration, &tx)?;
        draft.hex = tx.to_hex()?;
        draft.bumps = self.collect_bumps(&draft.configuration).await?;

        self.ctx.storage.save_draft(draft).await
    }

    async fn resolve_outputs(&self, config: &mut TransactionConfig) -> WalletResult<()> {
        if let Some(send_all) = &config.send_all_to {
            let sweep = TransactionOutput {
                satoshis: 0,
                use_for_change: true,
                scripts: Vec::new(),
                ..send_all.clone()
            };
            for output in config.outputs.iter_mut() {
                output.use_for_change = false;
            }
            config.outputs.insert(0, sweep);
        }

        for output in config.outputs.iter_mut() {
            output.scripts = self.process_output(output).await?;
        }
        Ok(())
    }

    async fn process_output(&self, output: &TransactionOutput) -> WalletResult<Vec<ScriptOutput>> {
        let scripts = if let Some(op_return) = &output.op_return {
            if output.satoshis > 0 {
                return Err(WalletError::InvalidOpReturnOutput(format!(
                    "op_return output carries {} satoshis",
                    output.satoshis
                )));
            }
            vec![ScriptOutput {
                address: String::new(),
                satoshis: 0,
                script: hex::encode(op_return.locking_script()?),
                script_type: ScriptType::NullData,
            }]
        } else if let Some(script) = &output.script {
            let raw = hex::decode(script)?;
            vec![ScriptOutput {
                address: address_from_locking_script(&raw).unwrap_or_default(),
                satoshis: output.satoshis,
                script: script.clone(),
                script_type: ScriptType::detect(&raw),
            }]
        } else {
            let scripts = self.ctx.resolver.resolve(&output.to, output.satoshis).await?;
            let resolved: u64 = scripts.iter().map(|s| s.satoshis).sum();
            if resolved != output.satoshis {
                return Err(WalletError::InvalidDestination(format!(
                    "{} resolved to {resolved} satoshis, {} requested",
                    output.to, output.satoshis
                )));
            }
            scripts
        };

        if !output.use_for_change {
            if let Some(script) = scripts
                .iter()
                .find(|s| s.script_type == ScriptType::PubKeyHash && s.satoshis == 0)
            {
                return Err(WalletError::OutputValueTooLow(format!(
                    "p2pkh output {} has no value",
                    script.address
                )));
            }
        }
        Ok(scripts)
    }

    async fn reserve_for_outputs(
        &self,
        draft: &DraftTransaction,
        fee_unit: FeeUnit,
    ) -> WalletResult<Reservation> {
        let config = &draft.configuration;
        let needed = config.total_output_satoshis();
        // The reservation engine charges the overhead and inputs itself
        let output_bytes: u64 = output_script_lens(config).into_iter().map(output_size).sum();
        let target = needed + fee_unit.fee_for_size(output_bytes);
        if target <= self.ctx.config.dust_limit && !config.contains_op_return() {
            return Err(WalletError::OutputValueTooLow(format!(
                "{target} satoshis is at or below the dust limit"
            )));
        }

        let request = ReservationRequest::new(&draft.owner_id, &draft.id, target)
            .with_fee_unit(fee_unit)
            .with_from_utxos(config.from_utxos.clone())
            .with_include_utxos(config.include_utxos.clone());
        self.reservations.reserve(&request).await
    }

    async fn attach_inputs(
        &self,
        draft: &mut DraftTransaction,
        reservation: &Reservation,
    ) -> WalletResult<()> {
        for utxo in reservation.utxos() {
            let destination = self
                .ctx
                .destinations
                .destination_for_script(&draft.owner_id, &utxo.script_pub_key)
                .await?
                .ok_or_else(|| WalletError::MissingDestination(utxo.script_pub_key.clone()))?;
            draft.configuration.inputs.push(TransactionInput {
                utxo: utxo.clone(),
                destination,
            });
        }
        Ok(())
    }

    async fn apply_change(&self, draft: &mut DraftTransaction, fee_unit: FeeUnit) -> WalletResult<()> {
        let config = &mut draft.configuration;
        let size = estimate_size(&input_types(&config.inputs), &output_script_lens(config));
        let inputs = config.total_input_satoshis();
        let needed = config.total_output_satoshis();
        if inputs < needed {
            return Err(WalletError::InsufficientFunds(format!(
                "inputs {inputs} do not cover outputs {needed}"
            )));
        }
        let available = inputs - needed;

        let change_outputs: Vec<usize> = config
            .outputs
            .iter()
            .enumerate()
            .filter(|(_, o)| o.use_for_change)
            .map(|(i, _)| i)
            .collect();

        if !change_outputs.is_empty() {
            let fee = fee_unit.fee_for_size(size);
            if available < fee {
                return Err(WalletError::InsufficientFunds(format!(
                    "{available} available after outputs, fee is {fee}"
                )));
            }
            let change = available - fee;
            let shares = split_remainder_first(change, change_outputs.len());
            for (index, share) in change_outputs.iter().zip(shares) {
                let output = &mut config.outputs[*index];
                output.satoshis += share;
                if let Some(script) = output.scripts.first_mut() {
                    script.satoshis += share;
                }
            }
            config.change_satoshis = change;
            config.fee = fee;
            return Ok(());
        }

        let plan = plan_change(&ChangeRequest {
            available,
            base_size: size,
            fee_unit,
            destinations: if config.change_number_of_destinations == 0 {
                self.ctx.config.change_destinations
            } else {
                config.change_number_of_destinations
            },
            minimum_satoshis: if config.change_minimum_satoshis == 0 {
                self.ctx.config.change_minimum_satoshis
            } else {
                config.change_minimum_satoshis
            },
            max_passes: self.ctx.config.change_passes,
        })?;
        config.fee = plan.fee;
        config.change_satoshis = plan.change_satoshis;
        if plan.destinations == 0 {
            return Ok(());
        }

        let shares = split_change(
            config.change_strategy,
            plan.change_satoshis,
            plan.destinations,
            &mut rand::thread_rng(),
        )?;
        for share in shares {
            let destination = self
                .ctx
                .destinations
                .new_change_destination(&draft.owner_id, &draft.id)
                .await?;
            config.outputs.push(TransactionOutput {
                to: destination.address.clone(),
                satoshis: share,
                scripts: vec![ScriptOutput {
                    address: destination.address.clone(),
                    satoshis: share,
                    script: destination.locking_script.clone(),
                    script_type: ScriptType::PubKeyHash,
                }],
                ..Default::default()
            });
            config.change_destinations.push(destination);
        }
        Ok(())
    }

    async fn collect_bumps(
        &self,
        config: &TransactionConfig,
    ) -> WalletResult<Vec<crate::data_structures::bump::Bump>> {
        let mut paths = Vec::new();
        for input in &config.inputs {
            let source = self
                .ctx
                .storage
                .get_transaction_by_id(&input.utxo.transaction_id)
                .await?;
            if let Some(bump) = source.map(|tx| tx.proof_bump()).transpose()?.flatten() {
                paths.push(bump);
            }
        }
        merge_bumps(group_by_height(paths))
    }
}

fn validate(owner_id: &str, config: &TransactionConfig) -> WalletResult<()> {
    if owner_id.trim().is_empty() {
        return Err(WalletError::InvalidConfiguration("owner id is required".to_string()));
    }
    if config.outputs.is_empty() && config.send_all_to.is_none() {
        return Err(WalletError::MissingTransactionOutputs);
    }
    if config.send_all_to.is_some() && !config.include_utxos.is_empty() {
        return Err(WalletError::InvalidConfiguration(
            "include_utxos cannot be combined with send_all_to".to_string(),
        ));
    }
    Ok(())
}

fn input_types(inputs: &[TransactionInput]) -> Vec<ScriptType> {
    inputs.iter().map(|i| i.utxo.script_type).collect()
}

fn output_script_lens(config: &TransactionConfig) -> Vec<u64> {
    config
        .outputs
        .iter()
        .flat_map(|o| o.scripts.iter().map(ScriptOutput::script_len))
        .collect()
}

/// Give the sweep output everything the inputs carry beyond the fee and the other outputs
fn apply_sweep(config: &mut TransactionConfig, fee_unit: FeeUnit, dust_limit: u64) -> WalletResult<()> {
    let total = config.total_input_satoshis();
    if total <= dust_limit {
        return Err(WalletError::OutputValueTooLow(format!(
            "sweep of {total} satoshis is at or below the dust limit"
        )));
    }
    let fee = fee_unit.fee_for_size(estimate_size(
        &input_types(&config.inputs),
        &output_script_lens(config),
    ));
    let others: u64 = config.outputs.iter().skip(1).map(|o| o.satoshis).sum();
    let swept = total
        .checked_sub(fee + others)
        .ok_or_else(|| WalletError::InsufficientFunds(format!(
            "sweep of {total} does not cover fee {fee} and outputs {others}"
        )))?;

    let output = &mut config.outputs[0];
    output.satoshis = swept;
    if let Some(script) = output.scripts.first_mut() {
        script.satoshis = swept;
    }
    config.fee = fee;
    Ok(())
}

/// Unsigned transaction: empty unlocking scripts, final sequence, lock time 0
fn assemble(config: &TransactionConfig) -> WalletResult<Transaction> {
    let inputs = config
        .inputs
        .iter()
        .map(|i| TxInput::unsigned(&i.utxo.pointer()))
        .collect::<WalletResult<Vec<_>>>()?;

    let mut outputs = Vec::new();
    for script in config.outputs.iter().flat_map(|o| o.scripts.iter()) {
        match script.script_type {
            ScriptType::NullData if script.satoshis > 0 => {
                return Err(WalletError::InvalidOpReturnOutput(format!(
                    "op_return script carries {} satoshis",
                    script.satoshis
                )));
            }
            ScriptType::PubKeyHash if script.satoshis == 0 => {
                return Err(WalletError::OutputValueTooLow(format!(
                    "p2pkh output {} has no value",
                    script.address
                )));
            }
            _ => {}
        }
        outputs.push(TxOutput {
            satoshis: script.satoshis,
            locking_script: hex::decode(&script.script)?,
        });
    }

    Ok(Transaction {
        version: 1,
        inputs,
        outputs,
        lock_time: 0,
    })
}

/// Final sanity checks: the assembled transaction must pay exactly the planned fee
fn reconcile(config: &TransactionConfig, tx: &Transaction) -> WalletResult<()> {
    let mut seen = HashSet::new();
    for input in &config.inputs {
        if !seen.insert(input.utxo.id.as_str()) {
            return Err(WalletError::DuplicateUtxo(input.utxo.id.clone()));
        }
    }
    let inputs: u64 = config.inputs.iter().map(|i| i.utxo.satoshis).sum();
    let outputs = tx.total_output_satoshis();
    if inputs < outputs {
        return Err(WalletError::OutputValueTooHigh { inputs, outputs });
    }
    if config.fee == 0 || inputs - outputs != config.fee {
        return Err(WalletError::InvalidFee {
            fee: config.fee,
            inputs,
            outputs,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::{destination::Destination, types::UtxoPointer, utxo::Utxo};

    fn input(id: &str, sats: u64) -> TransactionInput {
        let mut utxo = Utxo::new(
            "alice",
            UtxoPointer::new("aa".repeat(32), 0),
            "76a914000000000000000000000000000000000000000088ac",
            sats,
        );
        utxo.id = id.to_string();
        TransactionInput {
            utxo,
            destination: Destination {
                id: "d".into(),
                owner_id: "alice".into(),
                chain: 0,
                num: 0,
                address: String::new(),
                locking_script: String::new(),
                draft_id: None,
            },
        }
    }

    fn config(inputs: Vec<TransactionInput>, fee: u64) -> TransactionConfig {
        TransactionConfig {
            inputs,
            fee,
            ..Default::default()
        }
    }

    fn paying(outputs: &[u64]) -> Transaction {
        Transaction {
            version: 1,
            inputs: Vec::new(),
            outputs: outputs
                .iter()
                .map(|s| TxOutput {
                    satoshis: *s,
                    locking_script: vec![0x51],
                })
                .collect(),
            lock_time: 0,
        }
    }

    #[test]
    fn test_reconcile_accepts_balanced() {
        assert!(reconcile(&config(vec![input("a", 1000)], 10), &paying(&[990])).is_ok());
        assert!(reconcile(&config(vec![input("a", 1000)], 10), &paying(&[600, 390])).is_ok());
    }

    #[test]
    fn test_reconcile_error_order() {
        let dup = config(vec![input("a", 1000), input("a", 1000)], 10);
        assert!(matches!(reconcile(&dup, &paying(&[5000])), Err(WalletError::DuplicateUtxo(_))));

        let one = config(vec![input("a", 1000)], 10);
        assert!(matches!(
            reconcile(&one, &paying(&[1001])),
            Err(WalletError::OutputValueTooHigh { .. })
        ));

        let zero = config(vec![input("a", 1000)], 0);
        assert!(matches!(reconcile(&zero, &paying(&[1000])), Err(WalletError::InvalidFee { .. })));

        assert!(matches!(
            reconcile(&one, &paying(&[900])),
            Err(WalletError::InvalidFee { fee: 10, .. })
        ));
    }

    #[test]
    fn test_reconcile_counts_every_assembled_script() {
        // Two scripts paying 1200 behind an output the config records as 1000
        let mut cfg = config(vec![input("a", 100_000)], 14);
        cfg.outputs.push(TransactionOutput::to_address("x", 1000));
        let err = reconcile(&cfg, &paying(&[600, 600, 98_986])).unwrap_err();
        assert!(matches!(
            err,
            WalletError::OutputValueTooHigh {
                inputs: 100_000,
                outputs: 100_186
            }
        ));
        assert!(reconcile(&cfg, &paying(&[600, 400, 98_986])).is_ok());
    }

    #[test]
    fn test_validate_requires_outputs() {
        assert!(matches!(
            validate("alice", &TransactionConfig::new()),
            Err(WalletError::MissingTransactionOutputs)
        ));
        let both = TransactionConfig::new()
            .with_send_all_to(TransactionOutput::to_address("x", 0))
            .with_include_utxos(vec![UtxoPointer::new("aa".repeat(32), 0)]);
        assert!(matches!(validate("alice", &both), Err(WalletError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_assemble_rejects_valued_op_return() {
        let mut cfg = TransactionConfig::new();
        cfg.outputs.push(TransactionOutput {
            scripts: vec![ScriptOutput {
                address: String::new(),
                satoshis: 5,
                script: "006a".into(),
                script_type: ScriptType::NullData,
            }],
            ..Default::default()
        });
        assert!(matches!(assemble(&cfg), Err(WalletError::InvalidOpReturnOutput(_))));
    }

    #[test]
    fn test_sweep_subtracts_fee_and_other_outputs() {
        let mut cfg = TransactionConfig::new();
        cfg.inputs = (0..4).map(|i| input(&i.to_string(), 122_500)).collect();
        let script = ScriptOutput {
            address: String::new(),
            satoshis: 0,
            script: "76a914000000000000000000000000000000000000000088ac".into(),
            script_type: ScriptType::PubKeyHash,
        };
        cfg.outputs.push(TransactionOutput {
            use_for_change: true,
            scripts: vec![script],
            ..Default::default()
        });
        apply_sweep(&mut cfg, FeeUnit::new(1, 20), 1).unwrap();
        assert_eq!(cfg.fee, 32);
        assert_eq!(cfg.outputs[0].satoshis, 489_968);
        assert_eq!(cfg.outputs[0].scripts[0].satoshis, 489_968);
    }
}
