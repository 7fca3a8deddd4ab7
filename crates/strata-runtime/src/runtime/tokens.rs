//! Token operations of the running transaction.
//!
//! Flag checks come first, then authorization, then the ledger write, then
//! triggers and events. A failing trigger faults the whole transaction, so
//! nothing written here needs to be undone by hand.

use strata_primitives::{Address, Serializable};
use strata_types::{
    EventKind, TokenContent, TokenEventData, TokenFlags, TokenInfo, TokenInfusion, TokenSeries,
    TokenSeriesMode,
};
use strata_vm::{VmObject, VmResult};
use tracing::debug;

use super::{to_number, RuntimeVm};
use crate::error::RuntimeError;
use crate::ledger;
use crate::native::contract_address;
use crate::registry;

/// Largest accepted ROM or RAM payload
pub const MAX_TOKEN_DATA: usize = 1024;

impl RuntimeVm<'_> {
    /// Registered token
    pub fn token_info(&self, symbol: &str) -> VmResult<TokenInfo> {
        Ok(registry::token(self.registry(), symbol)?)
    }

    /// Whether `address` may mint `token`: the token owner or the token's
    /// own contract, and only as a witness
    pub fn is_minter(&self, token: &TokenInfo, address: &Address) -> VmResult<bool> {
        let allowed = *address == token.owner || *address == contract_address(&token.symbol);
        Ok(allowed && self.is_witness(address)?)
    }

    fn token_event(
        &mut self,
        kind: EventKind,
        address: Address,
        symbol: &str,
        value: u128,
    ) -> VmResult<()> {
        let data = TokenEventData::new(symbol, to_number(value)?, self.chain_name()).to_bytes();
        self.notify(kind, address, symbol, data);
        Ok(())
    }

    /// Move `amount` of a fungible token
    pub fn transfer_tokens(
        &mut self,
        symbol: &str,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> VmResult<()> {
        let token = self.token_info(symbol)?;
        if !token.is_transferable() {
            return Err(RuntimeError::TokenMustBeTransferable.into());
        }
        if !token.is_fungible() {
            return Err(RuntimeError::TokenMustBeFungible.into());
        }
        if amount == 0 {
            if self.protocol() >= 3 {
                return Err(RuntimeError::ZeroAmount.into());
            }
            return Ok(());
        }
        self.expect_witness(from)?;

        ledger::transfer(self.storage_mut(), symbol, from, to, amount)?;
        let args = [
            VmObject::Address(*from),
            VmObject::Address(*to),
            VmObject::from(symbol),
            VmObject::Number(to_number(amount)?),
        ];
        self.invoke_trigger(&token, "OnSend", &args)?;
        self.invoke_trigger(&token, "OnReceive", &args)?;

        self.token_event(EventKind::TokenSend, *from, symbol, amount)?;
        self.token_event(EventKind::TokenReceive, *to, symbol, amount)?;
        Ok(())
    }

    /// Mint `amount` of a fungible token to `to`
    pub fn mint_tokens(
        &mut self,
        symbol: &str,
        source: &Address,
        to: &Address,
        amount: u128,
    ) -> VmResult<()> {
        let token = self.token_info(symbol)?;
        if !token.has(TokenFlags::MINTABLE) {
            return Err(RuntimeError::TokenNotMintable.into());
        }
        if !token.is_fungible() {
            return Err(RuntimeError::TokenMustBeFungible.into());
        }
        if amount == 0 {
            return Err(RuntimeError::ZeroAmount.into());
        }
        if !self.is_minter(&token, source)? {
            return Err(RuntimeError::NotAuthorized(format!("{source} cannot mint {symbol}")).into());
        }

        ledger::add_supply(self.storage_mut(), &token, amount)?;
        ledger::credit(self.storage_mut(), symbol, to, amount)?;
        let args = [
            VmObject::Address(*source),
            VmObject::Address(*to),
            VmObject::from(symbol),
            VmObject::Number(to_number(amount)?),
        ];
        self.invoke_trigger(&token, "OnMint", &args)?;
        self.token_event(EventKind::TokenMint, *to, symbol, amount)?;
        Ok(())
    }

    /// Burn `amount` of a fungible token held by `from`
    pub fn burn_tokens(&mut self, symbol: &str, from: &Address, amount: u128) -> VmResult<()> {
        let token = self.token_info(symbol)?;
        if !token.has(TokenFlags::BURNABLE) {
            return Err(RuntimeError::TokenNotBurnable.into());
        }
        if !token.is_fungible() {
            return Err(RuntimeError::TokenMustBeFungible.into());
        }
        if amount == 0 {
            return Err(RuntimeError::ZeroAmount.into());
        }
        self.expect_witness(from)?;

        ledger::debit(self.storage_mut(), symbol, from, amount)?;
        ledger::sub_supply(self.storage_mut(), &token, amount)?;
        let args = [
            VmObject::Address(*from),
            VmObject::from(symbol),
            VmObject::Number(to_number(amount)?),
        ];
        self.invoke_trigger(&token, "OnBurn", &args)?;
        self.token_event(EventKind::TokenBurn, *from, symbol, amount)?;
        Ok(())
    }

    /// Mint one NFT of `symbol` into series `series_id` and return its id.
    ///
    /// Series 0 exists implicitly; any other series must have been created
    /// first. Duplicated series ignore `rom` and use the series ROM.
    pub fn mint_token(
        &mut self,
        symbol: &str,
        minter: &Address,
        to: &Address,
        rom: Vec<u8>,
        ram: Vec<u8>,
        series_id: u32,
    ) -> VmResult<u128> {
        let token = self.token_info(symbol)?;
        if token.is_fungible() {
            return Err(RuntimeError::TokenMustNotBeFungible.into());
        }
        if !token.has(TokenFlags::MINTABLE) {
            return Err(RuntimeError::TokenNotMintable.into());
        }
        if !self.is_minter(&token, minter)? {
            return Err(RuntimeError::NotAuthorized(format!("{minter} cannot mint {symbol}")).into());
        }
        if rom.len() > MAX_TOKEN_DATA || ram.len() > MAX_TOKEN_DATA {
            return Err(RuntimeError::Invalid(format!("{symbol} token data too large")).into());
        }

        let mut series = match registry::get_series(self.registry(), symbol, series_id)? {
            Some(series) => series,
            None if series_id == 0 => TokenSeries::new(0, 0, TokenSeriesMode::Unique),
            None => {
                return Err(RuntimeError::UnknownSeries {
                    symbol: symbol.to_string(),
                    series: series_id,
                }
                .into())
            }
        };
        if !series.can_mint() {
            return Err(RuntimeError::SupplyExceeded(format!("{symbol} series {series_id}")).into());
        }
        series.mint_count += 1;
        let mint_id = series.mint_count;
        let rom = match series.mode {
            TokenSeriesMode::Unique => rom,
            TokenSeriesMode::Duplicated => series.rom.clone(),
        };
        registry::set_series(self.registry_mut()?, symbol, &series)?;

        let id = ledger::token_id(symbol, &self.chain_address(), series_id, mint_id);
        if ledger::get_content(self.storage(), symbol, id)?.is_some() {
            return Err(RuntimeError::Duplicate {
                kind: "token id",
                name: format!("{symbol}/{id}"),
            }
            .into());
        }
        let content = TokenContent {
            token_id: id,
            series_id,
            mint_id,
            owner: *to,
            creator: *minter,
            current_chain: self.chain_name().to_string(),
            rom,
            ram,
            infusion: Vec::new(),
            timestamp: self.time(),
        };
        ledger::add_supply(self.storage_mut(), &token, 1)?;
        ledger::set_content(self.storage_mut(), symbol, &content)?;
        ledger::give_token(self.storage_mut(), symbol, to, id)?;

        let args = [
            VmObject::Address(*minter),
            VmObject::Address(*to),
            VmObject::from(symbol),
            VmObject::Number(to_number(id)?),
        ];
        self.invoke_trigger(&token, "OnMint", &args)?;
        debug!(symbol, id, series = series_id, "token minted");
        self.token_event(EventKind::TokenMint, *to, symbol, id)?;
        Ok(id)
    }

    /// Move NFT `id` from `from` to `to`
    pub fn transfer_token(
        &mut self,
        symbol: &str,
        from: &Address,
        to: &Address,
        id: u128,
    ) -> VmResult<()> {
        let token = self.token_info(symbol)?;
        if !token.is_transferable() {
            return Err(RuntimeError::TokenMustBeTransferable.into());
        }
        if token.is_fungible() {
            return Err(RuntimeError::TokenMustNotBeFungible.into());
        }
        self.expect_witness(from)?;

        let mut content = ledger::content(self.storage(), symbol, id)?;
        if content.owner != *from {
            return Err(RuntimeError::NotAuthorized(format!("{from} does not own {symbol} token {id}")).into());
        }
        ledger::take_token(self.storage_mut(), symbol, from, id)?;
        ledger::give_token(self.storage_mut(), symbol, to, id)?;
        content.owner = *to;
        ledger::set_content(self.storage_mut(), symbol, &content)?;

        let args = [
            VmObject::Address(*from),
            VmObject::Address(*to),
            VmObject::from(symbol),
            VmObject::Number(to_number(id)?),
        ];
        self.invoke_trigger(&token, "OnSend", &args)?;
        self.invoke_trigger(&token, "OnReceive", &args)?;

        self.token_event(EventKind::TokenSend, *from, symbol, id)?;
        self.token_event(EventKind::TokenReceive, *to, symbol, id)?;
        Ok(())
    }

    /// Destroy NFT `id`, releasing its infused assets to `from`
    pub fn burn_token(&mut self, symbol: &str, from: &Address, id: u128) -> VmResult<()> {
        let token = self.token_info(symbol)?;
        if !token.has(TokenFlags::BURNABLE) {
            return Err(RuntimeError::TokenNotBurnable.into());
        }
        if token.is_fungible() {
            return Err(RuntimeError::TokenMustNotBeFungible.into());
        }
        self.expect_witness(from)?;

        let content = ledger::content(self.storage(), symbol, id)?;
        if content.owner != *from {
            return Err(RuntimeError::NotAuthorized(format!("{from} does not own {symbol} token {id}")).into());
        }

        let holder = ledger::infusion_address(symbol, id);
        for infused in &content.infusion {
            self.release_infusion(&holder, from, infused)?;
        }

        ledger::take_token(self.storage_mut(), symbol, from, id)?;
        ledger::delete_content(self.storage_mut(), symbol, id)?;
        ledger::sub_supply(self.storage_mut(), &token, 1)?;

        let args = [
            VmObject::Address(*from),
            VmObject::from(symbol),
            VmObject::Number(to_number(id)?),
        ];
        self.invoke_trigger(&token, "OnBurn", &args)?;
        self.token_event(EventKind::TokenBurn, *from, symbol, id)?;
        Ok(())
    }

    fn release_infusion(
        &mut self,
        holder: &Address,
        to: &Address,
        infused: &TokenInfusion,
    ) -> VmResult<()> {
        let token = self.token_info(&infused.symbol)?;
        if token.is_fungible() {
            ledger::transfer(self.storage_mut(), &infused.symbol, holder, to, infused.value)?;
        } else {
            ledger::take_token(self.storage_mut(), &infused.symbol, holder, infused.value)?;
            ledger::give_token(self.storage_mut(), &infused.symbol, to, infused.value)?;
            let mut inner = ledger::content(self.storage(), &infused.symbol, infused.value)?;
            inner.owner = *to;
            ledger::set_content(self.storage_mut(), &infused.symbol, &inner)?;
        }
        Ok(())
    }

    /// Infuse `value` of `infused_symbol` (an amount, or an NFT id) into
    /// NFT `id` of `symbol`. The assets stay locked until the NFT is burnt.
    pub fn infuse_token(
        &mut self,
        symbol: &str,
        id: u128,
        from: &Address,
        infused_symbol: &str,
        value: u128,
    ) -> VmResult<()> {
        let token = self.token_info(symbol)?;
        if token.is_fungible() {
            return Err(RuntimeError::TokenMustNotBeFungible.into());
        }
        self.expect_witness(from)?;

        let mut content = ledger::content(self.storage(), symbol, id)?;
        let holder = ledger::infusion_address(symbol, id);
        let infused = self.token_info(infused_symbol)?;

        if infused.is_fungible() {
            if value == 0 {
                return Err(RuntimeError::ZeroAmount.into());
            }
            ledger::transfer(self.storage_mut(), infused_symbol, from, &holder, value)?;
            match content.infusion.iter_mut().find(|i| i.symbol == infused_symbol) {
                Some(existing) => existing.value += value,
                None => content.infusion.push(TokenInfusion {
                    symbol: infused_symbol.to_string(),
                    value,
                }),
            }
        } else {
            if infused_symbol == symbol && value == id {
                return Err(RuntimeError::Invalid(format!("{symbol} token {id} infused into itself")).into());
            }
            let mut inner = ledger::content(self.storage(), infused_symbol, value)?;
            if inner.owner != *from {
                return Err(RuntimeError::NotAuthorized(format!(
                    "{from} does not own {infused_symbol} token {value}"
                ))
                .into());
            }
            ledger::take_token(self.storage_mut(), infused_symbol, from, value)?;
            ledger::give_token(self.storage_mut(), infused_symbol, &holder, value)?;
            inner.owner = holder;
            ledger::set_content(self.storage_mut(), infused_symbol, &inner)?;
            content.infusion.push(TokenInfusion {
                symbol: infused_symbol.to_string(),
                value,
            });
        }
        ledger::set_content(self.storage_mut(), symbol, &content)?;

        let args = [
            VmObject::Address(*from),
            VmObject::Number(to_number(id)?),
            VmObject::from(infused_symbol),
            VmObject::Number(to_number(value)?),
        ];
        self.invoke_trigger(&token, "OnInfuse", &args)?;
        self.token_event(EventKind::Infusion, *from, infused_symbol, value)?;
        Ok(())
    }

    /// Current content of NFT `id`
    pub fn read_token(&self, symbol: &str, id: u128) -> VmResult<TokenContent> {
        Ok(ledger::content(self.storage(), symbol, id)?)
    }

    /// Replace the RAM of NFT `id`. Allowed for the owner and for the
    /// token's own contract.
    pub fn write_token(&mut self, symbol: &str, from: &Address, id: u128, ram: Vec<u8>) -> VmResult<()> {
        let token = self.token_info(symbol)?;
        if ram.len() > MAX_TOKEN_DATA {
            return Err(RuntimeError::Invalid(format!("{symbol} token data too large")).into());
        }
        let mut content = ledger::content(self.storage(), symbol, id)?;
        if *from != content.owner && *from != contract_address(symbol) {
            return Err(RuntimeError::NotAuthorized(format!("{from} cannot write {symbol} token {id}")).into());
        }
        self.expect_witness(from)?;

        content.ram = ram.clone();
        ledger::set_content(self.storage_mut(), symbol, &content)?;
        let args = [
            VmObject::Address(*from),
            VmObject::Number(to_number(id)?),
            VmObject::Bytes(ram),
        ];
        self.invoke_trigger(&token, "OnWrite", &args)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use strata_crypto::address_from_name;
    use strata_storage::MemoryStore;
    use strata_types::ContractAbi;

    use super::super::testing::{FakeChain, FakeNexus};
    use super::*;
    use crate::oracle::BlockOracle;
    use crate::registry::create_token;

    fn token(symbol: &str, flags: TokenFlags, owner: Address) -> TokenInfo {
        TokenInfo {
            symbol: symbol.into(),
            name: symbol.into(),
            owner,
            max_supply: 0,
            decimals: 0,
            flags,
            script: Vec::new(),
            abi: ContractAbi::default(),
        }
    }

    #[test]
    fn test_transfer_flag_order() {
        let (chain, nexus, store, oracle) =
            (FakeChain::root(), FakeNexus::default(), MemoryStore::new(), BlockOracle::empty());
        let owner = address_from_name("owner");
        let mut vm = RuntimeVm::new(&chain, &nexus, &store, &oracle);
        let registry = vm.registry_mut().unwrap();
        create_token(registry, &token("LOCK", TokenFlags::FUNGIBLE, owner)).unwrap();
        create_token(registry, &token("ART", TokenFlags::TRANSFERABLE, owner)).unwrap();

        let to = address_from_name("to");
        let err = vm.transfer_tokens("LOCK", &owner, &to, 1).unwrap_err();
        assert_eq!(err.to_string(), "token must be transferable");
        let err = vm.transfer_tokens("ART", &owner, &to, 1).unwrap_err();
        assert_eq!(err.to_string(), "token must be fungible");
    }

    #[test]
    fn test_zero_transfer_depends_on_protocol() {
        let (chain, nexus, store, oracle) =
            (FakeChain::root(), FakeNexus::default(), MemoryStore::new(), BlockOracle::empty());
        let owner = address_from_name("owner");
        let flags = TokenFlags::FUNGIBLE | TokenFlags::TRANSFERABLE;
        let to = address_from_name("to");

        let mut vm = RuntimeVm::new(&chain, &nexus, &store, &oracle).at_block(2, 0, 2);
        create_token(vm.registry_mut().unwrap(), &token("FUEL", flags, owner)).unwrap();
        assert!(vm.transfer_tokens("FUEL", &owner, &to, 0).is_ok());

        let mut vm = RuntimeVm::new(&chain, &nexus, &store, &oracle).at_block(2, 0, 3);
        create_token(vm.registry_mut().unwrap(), &token("FUEL", flags, owner)).unwrap();
        let err = vm.transfer_tokens("FUEL", &owner, &to, 0).unwrap_err();
        assert_eq!(err.to_string(), "amount must be greater than zero");
    }

    #[test]
    fn test_transfer_requires_witness() {
        let (chain, nexus, store, oracle) =
            (FakeChain::root(), FakeNexus::default(), MemoryStore::new(), BlockOracle::empty());
        let owner = address_from_name("owner");
        let flags = TokenFlags::FUNGIBLE | TokenFlags::TRANSFERABLE;
        let mut vm = RuntimeVm::new(&chain, &nexus, &store, &oracle);
        create_token(vm.registry_mut().unwrap(), &token("FUEL", flags, owner)).unwrap();
        ledger::credit(vm.storage_mut(), "FUEL", &owner, 10).unwrap();

        let err = vm
            .transfer_tokens("FUEL", &owner, &address_from_name("to"), 5)
            .unwrap_err();
        assert!(err.to_string().starts_with("witness failed"));
    }
}
