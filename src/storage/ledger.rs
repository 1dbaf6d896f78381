//! The account ledger
//!
//! Owns every locally tracked account. Name and address are unique; the
//! ledger enforces that itself, callers' `exists_*` pre-checks are advisory.
//!
//! Every mutation runs on a copy of the account list, is persisted, and
//! only then replaces the in-memory list. A failed write leaves both the
//! file and memory untouched.

use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use uuid::Uuid;

use super::file_system::LedgerFile;
use super::models::{Account, LedgerDocument, NewAccount};
use crate::address::{parse_private_key_hex, AddressCodec};
use crate::error::{StorageError, WalletError};
use crate::Result;

pub struct AccountLedger {
    file: Option<LedgerFile>,
    codec: AddressCodec,
    accounts: Mutex<Vec<Account>>,
}

impl AccountLedger {
    /// Open (or start) a ledger backed by `file`.
    pub fn open(file: LedgerFile, codec: AddressCodec) -> Result<Self> {
        let doc = file.load()?;
        log::info!(
            "Opened account ledger {:?} ({} accounts)",
            file.path(),
            doc.accounts.len()
        );
        Ok(Self {
            file: Some(file),
            codec,
            accounts: Mutex::new(doc.accounts),
        })
    }

    /// Ledger that lives only as long as the process.
    pub fn in_memory(codec: AddressCodec) -> Self {
        Self {
            file: None,
            codec,
            accounts: Mutex::new(Vec::new()),
        }
    }

    pub fn codec(&self) -> &AddressCodec {
        &self.codec
    }

    pub fn create(&self, new: NewAccount) -> Result<Account> {
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(WalletError::InvalidIntent(
                "account name must not be empty".to_string(),
            ));
        }
        if !self.codec.is_well_formed_address(&new.address) {
            return Err(WalletError::InvalidAddress(new.address));
        }
        if let Some(key) = &new.private_key {
            parse_private_key_hex(key)?;
        }

        let account = Account {
            id: Uuid::new_v4(),
            name,
            address: new.address,
            private_key: new.private_key,
            created_at: Utc::now(),
            on_chain: false,
        };

        self.mutate(|accounts| {
            if accounts.iter().any(|a| a.name == account.name) {
                return Err(WalletError::DuplicateName(account.name.clone()));
            }
            if accounts.iter().any(|a| a.address == account.address) {
                return Err(WalletError::DuplicateAddress(account.address.clone()));
            }
            accounts.push(account.clone());
            Ok(())
        })?;

        log::info!("Account '{}' saved ({})", account.name, account.address);
        Ok(account)
    }

    /// All accounts, newest first.
    pub fn list(&self) -> Result<Vec<Account>> {
        let mut accounts = self.lock()?.clone();
        sort_newest_first(&mut accounts);
        Ok(accounts)
    }

    pub fn get_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        Ok(self.lock()?.iter().find(|a| a.id == id).cloned())
    }

    pub fn get_by_address(&self, address: &str) -> Result<Option<Account>> {
        Ok(self.lock()?.iter().find(|a| a.address == address).cloned())
    }

    pub fn get_by_name(&self, name: &str) -> Result<Option<Account>> {
        Ok(self.lock()?.iter().find(|a| a.name == name).cloned())
    }

    /// Case-insensitive substring match on name or address, newest first.
    /// A blank keyword returns everything.
    pub fn search(&self, keyword: &str) -> Result<Vec<Account>> {
        let keyword = keyword.trim().to_lowercase();
        if keyword.is_empty() {
            return self.list();
        }
        let mut hits: Vec<Account> = self
            .lock()?
            .iter()
            .filter(|a| a.matches_keyword(&keyword))
            .cloned()
            .collect();
        sort_newest_first(&mut hits);
        Ok(hits)
    }

    pub fn rename_by_id(&self, id: Uuid, new_name: &str) -> Result<Account> {
        let new_name = new_name.trim().to_string();
        if new_name.is_empty() {
            return Err(WalletError::InvalidIntent(
                "account name must not be empty".to_string(),
            ));
        }
        let updated = self.mutate(|accounts| {
            if accounts.iter().any(|a| a.name == new_name && a.id != id) {
                return Err(WalletError::DuplicateName(new_name.clone()));
            }
            let account = find_mut(accounts, id)?;
            account.name = new_name.clone();
            Ok(account.clone())
        })?;
        log::info!("Account {} renamed to '{}'", id, updated.name);
        Ok(updated)
    }

    /// Attach a key to a read-only account. The caller is responsible for
    /// checking that the key derives to the stored address.
    pub fn attach_private_key(&self, id: Uuid, private_key: &str) -> Result<Account> {
        parse_private_key_hex(private_key)?;
        self.mutate(|accounts| {
            let account = find_mut(accounts, id)?;
            if account.private_key.is_some() {
                return Err(WalletError::PrivateKeyPresent(account.name.clone()));
            }
            account.private_key = Some(private_key.to_string());
            Ok(account.clone())
        })
    }

    /// Returns whether an account was removed.
    pub fn delete_by_id(&self, id: Uuid) -> Result<bool> {
        let removed = self.mutate(|accounts| {
            let before = accounts.len();
            accounts.retain(|a| a.id != id);
            Ok(accounts.len() != before)
        })?;
        if removed {
            log::info!("Account {} deleted", id);
        }
        Ok(removed)
    }

    pub fn exists_by_name(&self, name: &str) -> Result<bool> {
        Ok(self.lock()?.iter().any(|a| a.name == name))
    }

    pub fn exists_by_address(&self, address: &str) -> Result<bool> {
        Ok(self.lock()?.iter().any(|a| a.address == address))
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    /// Flip `on_chain` for the account at `address`. Unknown addresses and
    /// accounts already on-chain are left alone. Returns whether anything
    /// changed.
    pub fn mark_on_chain(&self, address: &str) -> Result<bool> {
        {
            let accounts = self.lock()?;
            match accounts.iter().find(|a| a.address == address) {
                Some(a) if !a.on_chain => {}
                _ => return Ok(false),
            }
        }
        let changed = self.mutate(|accounts| {
            match accounts.iter_mut().find(|a| a.address == address) {
                Some(a) if !a.on_chain => {
                    a.on_chain = true;
                    Ok(true)
                }
                _ => Ok(false),
            }
        })?;
        if changed {
            log::info!("Marked {} as on-chain", address);
        }
        Ok(changed)
    }

    pub fn list_on_chain(&self) -> Result<Vec<Account>> {
        let mut accounts: Vec<Account> = self
            .lock()?
            .iter()
            .filter(|a| a.on_chain)
            .cloned()
            .collect();
        sort_newest_first(&mut accounts);
        Ok(accounts)
    }

    /// Remove every account.
    pub fn clear(&self) -> Result<()> {
        self.mutate(|accounts| {
            accounts.clear();
            Ok(())
        })?;
        log::warn!("All accounts cleared");
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Account>>> {
        self.accounts
            .lock()
            .map_err(|_| WalletError::storage(StorageError::LockPoisoned))
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut Vec<Account>) -> Result<T>) -> Result<T> {
        let mut guard = self.lock()?;
        let mut working = guard.clone();
        let out = f(&mut working)?;
        if let Some(file) = &self.file {
            let doc = LedgerDocument {
                accounts: working.clone(),
                ..LedgerDocument::default()
            };
            file.save(&doc)?;
        }
        *guard = working;
        Ok(out)
    }
}

fn find_mut(accounts: &mut [Account], id: Uuid) -> Result<&mut Account> {
    accounts
        .iter_mut()
        .find(|a| a.id == id)
        .ok_or_else(|| WalletError::AccountNotFound(id.to_string()))
}

fn sort_newest_first(accounts: &mut [Account]) {
    accounts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
