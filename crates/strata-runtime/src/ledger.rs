//! Per-chain balance, supply and ownership sheets

use strata_crypto::sha256_concat;
use strata_primitives::{Address, AddressKind};
use strata_storage::{StorageContext, StorageMap, StorageReader, StorageSet};
use strata_types::{TokenContent, TokenInfo};

use crate::error::{RuntimeError, RuntimeResult};

const LEDGER: &str = "ledger";

fn balances(symbol: &str) -> StorageMap {
    StorageMap::field(LEDGER, &format!("balances.{symbol}"))
}

fn supplies() -> StorageMap {
    StorageMap::field(LEDGER, "supply")
}

fn ownership(symbol: &str, owner: &Address) -> StorageSet {
    StorageSet::field(LEDGER, &format!("owned.{symbol}.{}", owner.to_hex()))
}

fn contents(symbol: &str) -> StorageMap {
    StorageMap::field(LEDGER, &format!("nft.{symbol}"))
}

fn decode_amount(bytes: &[u8]) -> RuntimeResult<u128> {
    let array: [u8; 16] = bytes
        .try_into()
        .map_err(|_| RuntimeError::Invalid(format!("amount of {} bytes", bytes.len())))?;
    Ok(u128::from_le_bytes(array))
}

/// Fungible balance of `address`
pub fn balance<S: StorageReader + ?Sized>(storage: &S, symbol: &str, address: &Address) -> RuntimeResult<u128> {
    match balances(symbol).get(storage, address.as_bytes())? {
        Some(bytes) => decode_amount(&bytes),
        None => Ok(0),
    }
}

fn set_balance<S: StorageContext + ?Sized>(
    storage: &mut S,
    symbol: &str,
    address: &Address,
    amount: u128,
) -> RuntimeResult<()> {
    let map = balances(symbol);
    if amount == 0 {
        map.remove(storage, address.as_bytes())?;
    } else {
        map.set(storage, address.as_bytes(), amount.to_le_bytes().to_vec())?;
    }
    Ok(())
}

/// Add to a balance
pub fn credit<S: StorageContext + ?Sized>(
    storage: &mut S,
    symbol: &str,
    address: &Address,
    amount: u128,
) -> RuntimeResult<()> {
    let current = balance(storage, symbol, address)?;
    let updated = current
        .checked_add(amount)
        .ok_or_else(|| RuntimeError::Invalid(format!("{symbol} balance overflow")))?;
    set_balance(storage, symbol, address, updated)
}

/// Subtract from a balance
pub fn debit<S: StorageContext + ?Sized>(
    storage: &mut S,
    symbol: &str,
    address: &Address,
    amount: u128,
) -> RuntimeResult<()> {
    let current = balance(storage, symbol, address)?;
    if current < amount {
        return Err(RuntimeError::InsufficientBalance {
            symbol: symbol.to_string(),
            address: address.to_string(),
            required: amount,
            available: current,
        });
    }
    set_balance(storage, symbol, address, current - amount)
}

/// Move a fungible amount between addresses
pub fn transfer<S: StorageContext + ?Sized>(
    storage: &mut S,
    symbol: &str,
    from: &Address,
    to: &Address,
    amount: u128,
) -> RuntimeResult<()> {
    debit(storage, symbol, from, amount)?;
    credit(storage, symbol, to, amount)
}

/// Amount of `symbol` in existence on this chain
pub fn supply<S: StorageReader + ?Sized>(storage: &S, symbol: &str) -> RuntimeResult<u128> {
    match supplies().get(storage, symbol.as_bytes())? {
        Some(bytes) => decode_amount(&bytes),
        None => Ok(0),
    }
}

/// Grow the supply, enforcing the cap of finite tokens
pub fn add_supply<S: StorageContext + ?Sized>(
    storage: &mut S,
    token: &TokenInfo,
    amount: u128,
) -> RuntimeResult<()> {
    let updated = supply(storage, &token.symbol)?
        .checked_add(amount)
        .ok_or_else(|| RuntimeError::SupplyExceeded(token.symbol.clone()))?;
    if token.is_finite() && updated > token.max_supply {
        return Err(RuntimeError::SupplyExceeded(token.symbol.clone()));
    }
    supplies().set(storage, token.symbol.as_bytes(), updated.to_le_bytes().to_vec())?;
    Ok(())
}

/// Shrink the supply
pub fn sub_supply<S: StorageContext + ?Sized>(
    storage: &mut S,
    token: &TokenInfo,
    amount: u128,
) -> RuntimeResult<()> {
    let current = supply(storage, &token.symbol)?;
    let updated = current.checked_sub(amount).ok_or_else(|| {
        RuntimeError::Invalid(format!("burn of {amount} {} exceeds supply {current}", token.symbol))
    })?;
    supplies().set(storage, token.symbol.as_bytes(), updated.to_le_bytes().to_vec())?;
    Ok(())
}

/// NFT ids held by `owner`, ascending
pub fn owned_tokens<S: StorageReader + ?Sized>(
    storage: &S,
    symbol: &str,
    owner: &Address,
) -> RuntimeResult<Vec<u128>> {
    ownership(symbol, owner)
        .items(storage)?
        .iter()
        .map(|bytes| {
            let array: [u8; 16] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| RuntimeError::Invalid("token id".into()))?;
            Ok(u128::from_be_bytes(array))
        })
        .collect()
}

/// Number of NFTs of `symbol` held by `owner`
pub fn owned_count<S: StorageReader + ?Sized>(storage: &S, symbol: &str, owner: &Address) -> RuntimeResult<u64> {
    Ok(ownership(symbol, owner).count(storage)?)
}

/// Record `owner` as holding `id`
pub fn give_token<S: StorageContext + ?Sized>(
    storage: &mut S,
    symbol: &str,
    owner: &Address,
    id: u128,
) -> RuntimeResult<()> {
    ownership(symbol, owner).add(storage, &id.to_be_bytes())?;
    Ok(())
}

/// Drop `id` from the holdings of `owner`
pub fn take_token<S: StorageContext + ?Sized>(
    storage: &mut S,
    symbol: &str,
    owner: &Address,
    id: u128,
) -> RuntimeResult<()> {
    if !ownership(symbol, owner).remove(storage, &id.to_be_bytes())? {
        return Err(RuntimeError::NotAuthorized(format!(
            "{owner} does not own {symbol} token {id}"
        )));
    }
    Ok(())
}

/// Content of NFT `id`, if it exists
pub fn get_content<S: StorageReader + ?Sized>(
    storage: &S,
    symbol: &str,
    id: u128,
) -> RuntimeResult<Option<TokenContent>> {
    Ok(contents(symbol).get_value(storage, &id.to_be_bytes())?)
}

/// Content of NFT `id`
pub fn content<S: StorageReader + ?Sized>(storage: &S, symbol: &str, id: u128) -> RuntimeResult<TokenContent> {
    get_content(storage, symbol, id)?.ok_or_else(|| RuntimeError::UnknownTokenId {
        symbol: symbol.to_string(),
        id,
    })
}

/// Store NFT content
pub fn set_content<S: StorageContext + ?Sized>(
    storage: &mut S,
    symbol: &str,
    value: &TokenContent,
) -> RuntimeResult<()> {
    contents(symbol).set_value(storage, &value.token_id.to_be_bytes(), value)?;
    Ok(())
}

/// Delete NFT content
pub fn delete_content<S: StorageContext + ?Sized>(storage: &mut S, symbol: &str, id: u128) -> RuntimeResult<()> {
    contents(symbol).remove(storage, &id.to_be_bytes())?;
    Ok(())
}

/// Deterministic NFT id. The top bit is always clear so ids fit a VM number.
pub fn token_id(symbol: &str, chain: &Address, series_id: u32, mint_id: u32) -> u128 {
    let digest = sha256_concat(&[
        symbol.as_bytes(),
        chain.as_bytes(),
        &series_id.to_le_bytes(),
        &mint_id.to_le_bytes(),
    ]);
    let mut head = [0u8; 16];
    head.copy_from_slice(&digest.as_bytes()[..16]);
    u128::from_be_bytes(head) >> 1
}

/// Address holding the assets infused into NFT `id`
pub fn infusion_address(symbol: &str, id: u128) -> Address {
    let digest = sha256_concat(&[b"infusion", symbol.as_bytes(), &id.to_be_bytes()]);
    Address::from_parts(AddressKind::System, *digest.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_crypto::address_from_name;
    use strata_storage::{MemoryStore, StorageChangeSet};
    use strata_types::{ContractAbi, TokenFlags};

    fn capped(max: u128) -> TokenInfo {
        TokenInfo {
            symbol: "CAP".into(),
            name: "Capped".into(),
            owner: address_from_name("owner"),
            max_supply: max,
            decimals: 0,
            flags: TokenFlags::FUNGIBLE | TokenFlags::FINITE,
            script: Vec::new(),
            abi: ContractAbi::default(),
        }
    }

    #[test]
    fn test_transfer_moves_balance() {
        let store = MemoryStore::new();
        let mut changes = StorageChangeSet::new(&store);
        let (a, b) = (address_from_name("a"), address_from_name("b"));
        credit(&mut changes, "FUEL", &a, 100).unwrap();
        transfer(&mut changes, "FUEL", &a, &b, 40).unwrap();
        assert_eq!(balance(&changes, "FUEL", &a).unwrap(), 60);
        assert_eq!(balance(&changes, "FUEL", &b).unwrap(), 40);

        let err = transfer(&mut changes, "FUEL", &a, &b, 61).unwrap_err();
        assert!(matches!(err, RuntimeError::InsufficientBalance { required: 61, available: 60, .. }));
    }

    #[test]
    fn test_zero_balance_is_removed() {
        let store = MemoryStore::new();
        let mut changes = StorageChangeSet::new(&store);
        let a = address_from_name("a");
        credit(&mut changes, "FUEL", &a, 5).unwrap();
        debit(&mut changes, "FUEL", &a, 5).unwrap();
        assert_eq!(balances("FUEL").count(&changes).unwrap(), 0);
    }

    #[test]
    fn test_supply_cap() {
        let store = MemoryStore::new();
        let mut changes = StorageChangeSet::new(&store);
        let token = capped(10);
        add_supply(&mut changes, &token, 10).unwrap();
        assert!(matches!(
            add_supply(&mut changes, &token, 1),
            Err(RuntimeError::SupplyExceeded(_))
        ));
        sub_supply(&mut changes, &token, 4).unwrap();
        assert_eq!(supply(&changes, "CAP").unwrap(), 6);
        assert!(sub_supply(&mut changes, &token, 7).is_err());
    }

    #[test]
    fn test_ownership_sheet() {
        let store = MemoryStore::new();
        let mut changes = StorageChangeSet::new(&store);
        let a = address_from_name("a");
        give_token(&mut changes, "NFT", &a, 9).unwrap();
        give_token(&mut changes, "NFT", &a, 3).unwrap();
        assert_eq!(owned_tokens(&changes, "NFT", &a).unwrap(), vec![3, 9]);
        take_token(&mut changes, "NFT", &a, 9).unwrap();
        assert_eq!(owned_count(&changes, "NFT", &a).unwrap(), 1);
        assert!(take_token(&mut changes, "NFT", &a, 9).is_err());
    }

    #[test]
    fn test_token_id_is_stable() {
        let chain = address_from_name("main");
        let id = token_id("NFT", &chain, 0, 1);
        assert_eq!(id, token_id("NFT", &chain, 0, 1));
        assert_ne!(id, token_id("NFT", &chain, 0, 2));
        assert!(i128::try_from(id).is_ok());
    }
}
