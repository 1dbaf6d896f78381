//! Account Manager - Orchestration Layer
//!
//! Wires the ledger, the transaction engine and the reconciler together and
//! owns the default-account bootstrap.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use uuid::Uuid;

use crate::address::{parse_private_key_hex, private_key_to_hex, AddressCodec};
use crate::chain::query::{ChainQuery, RestClient};
use crate::chain::signer::{RestSigningConnector, SigningConnector};
use crate::config::{WalletConfig, DEFAULT_ACCOUNT_NAMES, FAUCET_THRESHOLD_UZETH};
use crate::error::WalletError;
use crate::faucet::FaucetClient;
use crate::format::NATIVE_DENOM;
use crate::reconciler::{ChainReconciler, PassSummary};
use crate::storage::{Account, AccountLedger, LedgerFile, NewAccount};
use crate::transactions::{
    is_success, MineParams, TransactionEngine, TransactionIntent, TransactionResult,
};
use crate::Result;

/// Whether an account's stored key still derives to its stored address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyConsistency {
    ReadOnly,
    Consistent,
    Mismatch { derived: String, stored: String },
}

/// What one bootstrap pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Default accounts created in this pass.
    pub created: Vec<String>,
    /// Default accounts the faucet was asked to top up.
    pub funded: Vec<String>,
    /// Balance or faucet failures, one line per account.
    pub failures: Vec<String>,
}

type BootstrapTask = Shared<BoxFuture<'static, Result<BootstrapReport>>>;

/// Everything a bootstrap pass needs, owned so the pass can outlive the
/// call that started it.
#[derive(Clone)]
struct BootstrapContext {
    ledger: Arc<AccountLedger>,
    query: Arc<dyn ChainQuery>,
    faucet: FaucetClient,
}

pub struct AccountManager {
    config: WalletConfig,
    ledger: Arc<AccountLedger>,
    query: Arc<dyn ChainQuery>,
    engine: TransactionEngine,
    reconciler: ChainReconciler,
    faucet: FaucetClient,
    /// In-flight bootstrap pass and its generation number.
    bootstrap: Mutex<Option<(u64, BootstrapTask)>>,
    bootstrap_generation: AtomicU64,
}

impl AccountManager {
    // ============================================================================
    // Constructors
    // ============================================================================

    /// Manager backed by the ledger file and endpoints in `config`.
    pub fn new(config: WalletConfig) -> Result<Self> {
        let codec = AddressCodec::new(config.address_prefix.clone())?;
        let ledger = Arc::new(AccountLedger::open(
            LedgerFile::new(&config.ledger_path),
            codec.clone(),
        )?);
        let query: Arc<dyn ChainQuery> =
            Arc::new(RestClient::new(config.rest_api.clone(), config.rpc_api.clone()));
        let connector: Arc<dyn SigningConnector> = Arc::new(
            RestSigningConnector::new(
                config.rest_api.clone(),
                config.chain_id.clone(),
                codec,
                config.gas_price.clone(),
            )
            .with_poll(config.poll),
        );
        Ok(Self::with_parts(config, ledger, query, connector))
    }

    /// Manager over caller-supplied channels (for testing).
    pub fn with_parts(
        config: WalletConfig,
        ledger: Arc<AccountLedger>,
        query: Arc<dyn ChainQuery>,
        connector: Arc<dyn SigningConnector>,
    ) -> Self {
        let engine = TransactionEngine::new(connector, ledger.codec().clone())
            .with_sender_policy(config.sender_policy);
        let reconciler = ChainReconciler::new(Arc::clone(&query), Arc::clone(&ledger));
        let faucet = FaucetClient::new(config.faucet_api.clone());
        Self {
            config,
            ledger,
            query,
            engine,
            reconciler,
            faucet,
            bootstrap: Mutex::new(None),
            bootstrap_generation: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<AccountLedger> {
        &self.ledger
    }

    pub fn engine(&self) -> &TransactionEngine {
        &self.engine
    }

    pub fn reconciler(&self) -> &ChainReconciler {
        &self.reconciler
    }

    // ============================================================================
    // Account lifecycle
    // ============================================================================

    /// New account with a fresh random key.
    pub fn generate_account(&self, name: &str) -> Result<Account> {
        let (private_key, address) = self.ledger.codec().generate_account_keys()?;
        self.ledger
            .create(NewAccount::with_key(name, address, private_key))
    }

    /// Import a hex private key under `name`.
    ///
    /// If a read-only account already holds the derived address, the key is
    /// attached to it and it is renamed to `name`.
    pub fn import_private_key(&self, name: &str, private_key_hex: &str) -> Result<Account> {
        let name = name.trim();
        let key = parse_private_key_hex(private_key_hex.trim())?;
        let address = self.ledger.codec().derive_public_address(&key)?;
        let key_hex = private_key_to_hex(&key);

        let Some(existing) = self.ledger.get_by_address(&address)? else {
            return self
                .ledger
                .create(NewAccount::with_key(name, address, key_hex));
        };

        if !existing.is_read_only() {
            return Err(WalletError::DuplicateAddress(address));
        }
        if let Some(other) = self.ledger.get_by_name(name)? {
            if other.id != existing.id {
                return Err(WalletError::DuplicateName(name.to_string()));
            }
        }

        self.ledger.attach_private_key(existing.id, &key_hex)?;
        let account = if existing.name == name {
            self.ledger
                .get_by_id(existing.id)?
                .ok_or_else(|| WalletError::AccountNotFound(existing.id.to_string()))?
        } else {
            self.ledger.rename_by_id(existing.id, name)?
        };
        log::info!(
            "Key attached to read-only account {} ({})",
            account.name,
            account.address
        );
        Ok(account)
    }

    /// Track an address without a key.
    pub fn import_watch_only(&self, name: &str, address: &str) -> Result<Account> {
        self.ledger
            .create(NewAccount::watch_only(name, address.trim()))
    }

    /// Compare the stored key's derived address with the stored address.
    /// A mismatch is reported and logged, never corrected.
    pub fn check_consistency(&self, account: &Account) -> Result<KeyConsistency> {
        let Some(key) = &account.private_key else {
            return Ok(KeyConsistency::ReadOnly);
        };
        let derived = self.ledger.codec().derive_from_hex(key)?;
        if derived == account.address {
            return Ok(KeyConsistency::Consistent);
        }
        log::warn!(
            "Account '{}' stores address {} but its key derives to {}",
            account.name,
            account.address,
            derived
        );
        Ok(KeyConsistency::Mismatch {
            derived,
            stored: account.address.clone(),
        })
    }

    // ============================================================================
    // Bootstrap
    // ============================================================================

    /// Make sure the default accounts exist and hold at least the faucet
    /// threshold. Concurrent callers share one in-flight pass; a call after
    /// it settles starts a new one.
    pub async fn ensure_default_accounts(&self) -> Result<BootstrapReport> {
        let (generation, task) = {
            let mut slot = self.bootstrap.lock().unwrap_or_else(|e| e.into_inner());
            match slot.as_ref() {
                Some((generation, task)) => {
                    log::debug!("Joining bootstrap pass {} already in flight", generation);
                    (*generation, task.clone())
                }
                None => {
                    let ctx = BootstrapContext {
                        ledger: Arc::clone(&self.ledger),
                        query: Arc::clone(&self.query),
                        faucet: self.faucet.clone(),
                    };
                    let generation = self.bootstrap_generation.fetch_add(1, Ordering::SeqCst);
                    let task = run_bootstrap(ctx).boxed().shared();
                    *slot = Some((generation, task.clone()));
                    (generation, task)
                }
            }
        };

        let outcome = task.await;

        let mut slot = self.bootstrap.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|(current, _)| *current == generation) {
            *slot = None;
        }
        outcome
    }

    // ============================================================================
    // Transactions
    // ============================================================================

    /// Transfer from a ledger account. Both parties are marked on-chain
    /// when the transfer succeeds.
    pub async fn send_transfer(
        &self,
        account_id: Uuid,
        receiver: &str,
        amount: u128,
        denom: &str,
        memo: Option<String>,
    ) -> Result<TransactionResult> {
        let account = self.signing_account(account_id)?;
        let key = account
            .private_key
            .as_deref()
            .ok_or_else(|| WalletError::NoPrivateKey(account.name.clone()))?;

        let mut intent = TransactionIntent::new(&account.address, receiver.trim(), amount, denom);
        intent.memo = memo;
        let result = self.engine.transfer(key, &intent).await?;

        if is_success(&result) {
            for address in [account.address.as_str(), intent.receiver.as_str()] {
                if let Err(e) = self.ledger.mark_on_chain(address) {
                    log::warn!("Could not mark {} on-chain: {}", address, e);
                }
            }
        }
        Ok(result)
    }

    pub async fn mine(&self, account_id: Uuid) -> Result<TransactionResult> {
        let account = self.signing_account(account_id)?;
        let key = account
            .private_key
            .as_deref()
            .ok_or_else(|| WalletError::NoPrivateKey(account.name.clone()))?;
        self.engine
            .mine(key, &MineParams::new(account.address.clone()))
            .await
    }

    /// Gas estimate for a transfer from a ledger account.
    pub async fn estimate_transfer_gas(
        &self,
        account_id: Uuid,
        receiver: &str,
        amount: u128,
        denom: &str,
    ) -> Result<u64> {
        let account = self.signing_account(account_id)?;
        let key = account
            .private_key
            .as_deref()
            .ok_or_else(|| WalletError::NoPrivateKey(account.name.clone()))?;
        let intent = TransactionIntent::new(&account.address, receiver.trim(), amount, denom);
        Ok(self.engine.estimate_gas(key, &intent).await)
    }

    // ============================================================================
    // Reconciliation
    // ============================================================================

    /// One balance pass over every ledger account.
    pub async fn refresh_all_balances(&self, concurrency: usize) -> Result<PassSummary> {
        let accounts = self.ledger.list()?;
        Ok(self
            .reconciler
            .refresh_balances(&accounts, concurrency)
            .await)
    }

    fn signing_account(&self, account_id: Uuid) -> Result<Account> {
        let account = self
            .ledger
            .get_by_id(account_id)?
            .ok_or_else(|| WalletError::AccountNotFound(account_id.to_string()))?;
        if !account.is_read_only() {
            self.check_consistency(&account)?;
        }
        Ok(account)
    }
}

async fn run_bootstrap(ctx: BootstrapContext) -> Result<BootstrapReport> {
    let mut report = BootstrapReport::default();
    let codec = ctx.ledger.codec().clone();

    for name in DEFAULT_ACCOUNT_NAMES {
        if ctx.ledger.exists_by_name(name)? {
            continue;
        }
        let (private_key, address) = codec.generate_account_keys()?;
        match ctx
            .ledger
            .create(NewAccount::with_key(name, address, private_key))
        {
            Ok(account) => {
                log::info!("Created default account {} ({})", name, account.address);
                report.created.push(name.to_string());
            }
            Err(WalletError::DuplicateName(_)) => {}
            Err(e) => return Err(e),
        }
    }

    let top_up = format!("{}{}", FAUCET_THRESHOLD_UZETH, NATIVE_DENOM);
    for name in DEFAULT_ACCOUNT_NAMES {
        let Some(account) = ctx.ledger.get_by_name(name)? else {
            continue;
        };
        let balance = match ctx.query.balances(&account.address).await {
            Ok(coins) => coins
                .iter()
                .filter(|c| c.denom == NATIVE_DENOM)
                .map(|c| c.amount)
                .sum::<u128>(),
            Err(e) => {
                log::warn!("Balance of default account {} unavailable: {}", name, e);
                report.failures.push(format!("{}: {}", name, e));
                continue;
            }
        };
        if balance >= FAUCET_THRESHOLD_UZETH {
            continue;
        }
        match ctx
            .faucet
            .credit(&account.address, std::slice::from_ref(&top_up))
            .await
        {
            Ok(_) => {
                log::info!("Faucet credited {} to {}", top_up, name);
                report.funded.push(name.to_string());
            }
            Err(e) => {
                log::warn!("Faucet top-up for {} failed: {}", name, e);
                report.failures.push(format!("{}: {}", name, e));
            }
        }
    }

    Ok(report)
}
