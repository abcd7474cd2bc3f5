//! Authorization registry for privileged ledger mutations.
//!
//! Privileged mutation (moving funds between wallets without their
//! signature) is restricted to vetted services, and every enablement is
//! subject to an activation delay so a freshly registered service cannot
//! act immediately.

use std::collections::{HashMap, HashSet};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    config::{Height, MIN_SERVICE_ACTIVATION_TIMEOUT},
    crypto::Address,
    error::{CoreError, CoreResult},
};

/// Closed set of privileged actions a service can be enabled for.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, std::hash::Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceAction {
    /// Stage on behalf of a wallet (settlement proxies).
    Stage,
    /// Move deposited funds into another wallet's settled balance.
    TransferToSettled,
    /// Withdraw deposited funds to an external destination.
    WithdrawFromDeposited,
    /// Sweep a wallet's deposited + settled balances.
    Seize,
    /// Close an accrual period.
    CloseAccrualPeriod,
    /// Stage a security-bond reward.
    StageBond,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRegistration {
    pub registered_at: Height,
    pub enabled: HashSet<ServiceAction>,
    pub disabled: bool,
}

/// Explicit authorization state passed to every privileged operation.
/// Capability checks are pure predicates over this value.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationState {
    owner: Address,
    /// Address allowed to flip wallet locks (the external locker
    /// collaborator).
    locker: Address,
    activation_timeout: Height,
    services: HashMap<Address, ServiceRegistration>,
    beneficiaries: HashSet<Address>,
    locked_wallets: HashSet<Address>,
}

impl AuthorizationState {
    pub fn new(owner: Address, locker: Address, activation_timeout: Height) -> Self {
        Self {
            owner,
            locker,
            activation_timeout: activation_timeout.max(MIN_SERVICE_ACTIVATION_TIMEOUT),
            services: HashMap::new(),
            beneficiaries: HashSet::new(),
            locked_wallets: HashSet::new(),
        }
    }

    pub fn owner(&self) -> &Address {
        &self.owner
    }

    pub fn activation_timeout(&self) -> Height {
        self.activation_timeout
    }

    /// Owner-configurable, with the protocol minimum enforced.
    pub fn set_activation_timeout(&mut self, caller: &Address, timeout: Height) -> CoreResult<()> {
        self.require_owner(caller)?;
        self.activation_timeout = timeout.max(MIN_SERVICE_ACTIVATION_TIMEOUT);
        Ok(())
    }

    pub fn register_service(
        &mut self,
        caller: &Address,
        service: Address,
        height: Height,
    ) -> CoreResult<()> {
        self.require_owner(caller)?;
        if self.services.contains_key(&service) {
            return Err(CoreError::InvalidState("service already registered"));
        }
        self.services.insert(
            service,
            ServiceRegistration {
                registered_at: height,
                enabled: HashSet::new(),
                disabled: false,
            },
        );
        debug!("service {} registered at height {}", service, height);
        Ok(())
    }

    /// Flip a per-action enable bit to true. Only allowed once the
    /// activation timeout has elapsed since registration.
    pub fn enable_service_action(
        &mut self,
        caller: &Address,
        service: &Address,
        action: ServiceAction,
        height: Height,
    ) -> CoreResult<()> {
        self.require_owner(caller)?;
        let timeout = self.activation_timeout;
        let registration = self
            .services
            .get_mut(service)
            .ok_or(CoreError::InvalidState("service not registered"))?;
        if registration.disabled {
            return Err(CoreError::InvalidState("service is disabled"));
        }
        let gate = registration.registered_at.saturating_add(timeout);
        if height < gate {
            return Err(CoreError::OutOfWindow { gate, now: height });
        }
        registration.enabled.insert(action);
        debug!("service {} enabled for {} at height {}", service, action, height);
        Ok(())
    }

    /// Disable a service. Usable by the owner or by the service itself.
    pub fn disable_service(&mut self, caller: &Address, service: &Address) -> CoreResult<()> {
        if caller != &self.owner && caller != service {
            return Err(CoreError::Unauthorized);
        }
        let registration = self
            .services
            .get_mut(service)
            .ok_or(CoreError::InvalidState("service not registered"))?;
        registration.disabled = true;
        warn!("service {} disabled", service);
        Ok(())
    }

    pub fn deregister_service(&mut self, caller: &Address, service: &Address) -> CoreResult<()> {
        if caller != &self.owner && caller != service {
            return Err(CoreError::Unauthorized);
        }
        self.services
            .remove(service)
            .ok_or(CoreError::InvalidState("service not registered"))?;
        Ok(())
    }

    pub fn register_beneficiary(&mut self, caller: &Address, beneficiary: Address) -> CoreResult<()> {
        self.require_owner(caller)?;
        self.beneficiaries.insert(beneficiary);
        Ok(())
    }

    pub fn deregister_beneficiary(&mut self, caller: &Address, beneficiary: &Address) -> CoreResult<()> {
        self.require_owner(caller)?;
        self.beneficiaries.remove(beneficiary);
        Ok(())
    }

    /// Lock or unlock a wallet. Only the configured locker may call; a
    /// locked wallet cannot withdraw or open challenges.
    pub fn set_wallet_lock(&mut self, caller: &Address, wallet: Address, locked: bool) -> CoreResult<()> {
        if caller != &self.locker {
            return Err(CoreError::Unauthorized);
        }
        if locked {
            self.locked_wallets.insert(wallet);
            warn!("wallet {} locked", wallet);
        } else {
            self.locked_wallets.remove(&wallet);
            debug!("wallet {} unlocked", wallet);
        }
        Ok(())
    }

    // === Pure predicates ===

    pub fn is_registered_service(&self, service: &Address) -> bool {
        self.services.contains_key(service)
    }

    pub fn is_enabled_service(&self, service: &Address, action: ServiceAction) -> bool {
        self.services
            .get(service)
            .map(|registration| !registration.disabled && registration.enabled.contains(&action))
            .unwrap_or(false)
    }

    pub fn is_registered_beneficiary(&self, beneficiary: &Address) -> bool {
        self.beneficiaries.contains(beneficiary)
    }

    pub fn is_wallet_locked(&self, wallet: &Address) -> bool {
        self.locked_wallets.contains(wallet)
    }

    fn require_owner(&self, caller: &Address) -> CoreResult<()> {
        if caller != &self.owner {
            return Err(CoreError::Unauthorized);
        }
        Ok(())
    }
}
