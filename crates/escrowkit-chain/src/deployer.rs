//! Creates escrow instances on the external ledger.

use std::sync::Arc;

use escrowkit_types::{Address, EscrowError, Result, Wei};
use escrowkit_wallet::SignerHandle;

use crate::contract::{ContractHandle, PendingTransaction};
use crate::ledger::ExternalLedger;
use crate::transaction::{SignedTransaction, TxPayload};

/// Validated constructor arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployParams {
    pub arbiter: Address,
    pub beneficiary: Address,
    pub deposit_value: Wei,
}

impl DeployParams {
    /// Validate raw user input. Runs before any remote call.
    pub fn parse(arbiter: &str, beneficiary: &str, deposit_value: &str) -> Result<Self> {
        let arbiter = Address::parse(arbiter).map_err(|e| rename_field(e, "arbiter"))?;
        let beneficiary =
            Address::parse(beneficiary).map_err(|e| rename_field(e, "beneficiary"))?;
        let deposit_value = Wei::parse_wei(deposit_value)?;
        Ok(Self {
            arbiter,
            beneficiary,
            deposit_value,
        })
    }
}

fn rename_field(err: EscrowError, field: &str) -> EscrowError {
    match err {
        EscrowError::InvalidParameter { reason, .. } => EscrowError::invalid_parameter(field, reason),
        other => other,
    }
}

/// Deploys escrow contracts
#[derive(Clone)]
pub struct Deployer {
    chain: Arc<dyn ExternalLedger>,
}

impl Deployer {
    pub fn new(chain: Arc<dyn ExternalLedger>) -> Self {
        Self { chain }
    }

    /// Validate, deploy, and wait until the instance is confirmed.
    pub async fn deploy(
        &self,
        signer: &SignerHandle,
        arbiter: &str,
        beneficiary: &str,
        deposit_value: &str,
    ) -> Result<ContractHandle> {
        let params = DeployParams::parse(arbiter, beneficiary, deposit_value)?;
        self.deploy_params(signer, params).await
    }

    /// Deploy already-validated parameters and wait for confirmation.
    pub async fn deploy_params(
        &self,
        signer: &SignerHandle,
        params: DeployParams,
    ) -> Result<ContractHandle> {
        let tx = SignedTransaction::sign(
            signer,
            TxPayload::Deploy {
                arbiter: params.arbiter,
                beneficiary: params.beneficiary,
                value: params.deposit_value,
            },
        )?;
        let hash = match self.chain.submit(tx).await {
            Ok(hash) => hash,
            Err(e) => {
                tracing::warn!(error = %e, "Escrow deployment refused");
                return Err(e);
            }
        };
        let receipt = PendingTransaction::new(self.chain.clone(), hash, "deploy")
            .wait()
            .await
            .map_err(|e| {
                tracing::warn!(tx = %hash, error = %e, "Escrow deployment failed to confirm");
                e
            })?;
        let address = receipt.contract_address.ok_or_else(|| {
            EscrowError::internal(format!("deployment {} confirmed without a contract address", hash))
        })?;

        tracing::info!(
            contract = %address,
            arbiter = %params.arbiter,
            beneficiary = %params.beneficiary,
            value = %params.deposit_value,
            block = receipt.block_number,
            "Escrow deployed"
        );

        Ok(ContractHandle::new(
            self.chain.clone(),
            address,
            params.arbiter,
            params.beneficiary,
            params.deposit_value,
            signer.address(),
        ))
    }
}
