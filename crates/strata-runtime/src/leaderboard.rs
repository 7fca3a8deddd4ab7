//! Ranked score tables kept in chain storage.
//!
//! Rows are sorted by descending score and capped at the board capacity; an
//! address appears at most once and only ever improves its score until the
//! board is reset.

use strata_primitives::{Address, BinaryReader, BinaryWriter, CodecResult, Serializable};
use strata_storage::{StorageContext, StorageList, StorageMap, StorageReader};

use crate::error::{RuntimeError, RuntimeResult};
use crate::native::NativeContractKind;
use crate::registry::validate_name;

/// Leaderboard header
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Leaderboard {
    /// Board name
    pub name: String,
    /// Address allowed to insert and reset
    pub owner: Address,
    /// Maximum number of rows
    pub capacity: u32,
    /// Number of resets so far
    pub round: u32,
}

impl Serializable for Leaderboard {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_string(&self.name);
        writer.write_address(&self.owner);
        writer.write_u32(self.capacity);
        writer.write_u32(self.round);
    }

    fn unserialize(reader: &mut BinaryReader<'_>) -> CodecResult<Self> {
        Ok(Self {
            name: reader.read_string()?,
            owner: reader.read_address()?,
            capacity: reader.read_u32()?,
            round: reader.read_u32()?,
        })
    }
}

/// One ranked row
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaderboardEntry {
    /// Ranked address
    pub address: Address,
    /// Score
    pub score: i128,
}

impl Serializable for LeaderboardEntry {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_address(&self.address);
        writer.write_bigint(self.score);
    }

    fn unserialize(reader: &mut BinaryReader<'_>) -> CodecResult<Self> {
        Ok(Self {
            address: reader.read_address()?,
            score: reader.read_bigint()?,
        })
    }
}

fn boards() -> StorageMap {
    StorageMap::field(NativeContractKind::Ranking.name(), "boards")
}

fn rows(name: &str) -> StorageList {
    StorageList::field(NativeContractKind::Ranking.name(), &format!("rows.{name}"))
}

/// Board by name
pub fn get<S: StorageReader + ?Sized>(storage: &S, name: &str) -> RuntimeResult<Leaderboard> {
    boards()
        .get_value(storage, name.as_bytes())?
        .ok_or_else(|| RuntimeError::Invalid(format!("leaderboard {name}")))
}

/// Create an empty board
pub fn create<S: StorageContext + ?Sized>(
    storage: &mut S,
    name: &str,
    owner: Address,
    capacity: u32,
) -> RuntimeResult<Leaderboard> {
    validate_name(name)?;
    if capacity == 0 {
        return Err(RuntimeError::Invalid("leaderboard capacity".into()));
    }
    if boards().contains(storage, name.as_bytes())? {
        return Err(RuntimeError::Duplicate {
            kind: "leaderboard",
            name: name.to_string(),
        });
    }
    let board = Leaderboard {
        name: name.to_string(),
        owner,
        capacity,
        round: 0,
    };
    boards().set_value(storage, name.as_bytes(), &board)?;
    Ok(board)
}

/// Rows in rank order
pub fn entries<S: StorageReader + ?Sized>(storage: &S, name: &str) -> RuntimeResult<Vec<LeaderboardEntry>> {
    let list = rows(name);
    (0..list.len(storage)?)
        .map(|i| Ok(list.get_value(storage, i)?))
        .collect()
}

/// Record `score` for `target`. Returns whether the board changed: lower
/// scores than the current one are ignored, as are scores that would not
/// make a full board.
pub fn insert<S: StorageContext + ?Sized>(
    storage: &mut S,
    name: &str,
    target: Address,
    score: i128,
) -> RuntimeResult<bool> {
    let board = get(storage, name)?;
    let mut current = entries(storage, name)?;

    if let Some(pos) = current.iter().position(|e| e.address == target) {
        if current[pos].score >= score {
            return Ok(false);
        }
        current.remove(pos);
    }
    let rank = current.partition_point(|e| e.score >= score);
    if rank >= board.capacity as usize {
        return Ok(false);
    }
    current.insert(rank, LeaderboardEntry { address: target, score });
    current.truncate(board.capacity as usize);

    let list = rows(name);
    list.clear(storage)?;
    for entry in &current {
        list.push(storage, entry.to_bytes())?;
    }
    Ok(true)
}

/// Address at rank `index`, null past the end
pub fn address_at<S: StorageReader + ?Sized>(storage: &S, name: &str, index: u64) -> RuntimeResult<Address> {
    get(storage, name)?;
    let list = rows(name);
    if index >= list.len(storage)? {
        return Ok(Address::NULL);
    }
    let entry: LeaderboardEntry = list.get_value(storage, index)?;
    Ok(entry.address)
}

/// Score of `target`, zero when unranked
pub fn score_of<S: StorageReader + ?Sized>(storage: &S, name: &str, target: &Address) -> RuntimeResult<i128> {
    get(storage, name)?;
    Ok(entries(storage, name)?
        .into_iter()
        .find(|e| e.address == *target)
        .map(|e| e.score)
        .unwrap_or(0))
}

/// Number of ranked rows
pub fn size<S: StorageReader + ?Sized>(storage: &S, name: &str) -> RuntimeResult<u64> {
    get(storage, name)?;
    Ok(rows(name).len(storage)?)
}

/// Drop every row and start a new round
pub fn reset<S: StorageContext + ?Sized>(storage: &mut S, name: &str) -> RuntimeResult<u32> {
    let mut board = get(storage, name)?;
    rows(name).clear(storage)?;
    board.round += 1;
    boards().set_value(storage, name.as_bytes(), &board)?;
    Ok(board.round)
}
