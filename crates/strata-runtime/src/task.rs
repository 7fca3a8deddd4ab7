//! Chain task bookkeeping and scheduling rules

use strata_primitives::{
    Address, BinaryReader, BinaryWriter, BlockHeight, CodecResult, Serializable, Timestamp,
};
use strata_storage::{StorageContext, StorageMap, StorageReader};
use strata_types::{ChainTask, TaskFrequencyMode};

use crate::error::{RuntimeError, RuntimeResult};

fn tasks() -> StorageMap {
    StorageMap::field("chain", "tasks")
}

fn runs() -> StorageMap {
    StorageMap::field("chain", "taskrun")
}

/// Last run of a task; written at creation with `runs == 0`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskRun {
    /// Height of the last run, or of creation
    pub height: BlockHeight,
    /// Time of the last run, or of creation
    pub time: Timestamp,
    /// Completed runs
    pub runs: u64,
}

impl Serializable for TaskRun {
    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u64(self.height);
        writer.write_u32(self.time);
        writer.write_u64(self.runs);
    }

    fn unserialize(reader: &mut BinaryReader<'_>) -> CodecResult<Self> {
        Ok(Self {
            height: reader.read_u64()?,
            time: reader.read_u32()?,
            runs: reader.read_u64()?,
        })
    }
}

/// Task by id, if any
pub fn get_task<S: StorageReader + ?Sized>(storage: &S, id: u64) -> RuntimeResult<Option<ChainTask>> {
    Ok(tasks().get_value(storage, &id.to_be_bytes())?)
}

/// Task by id
pub fn task<S: StorageReader + ?Sized>(storage: &S, id: u64) -> RuntimeResult<ChainTask> {
    get_task(storage, id)?.ok_or(RuntimeError::UnknownTask(id))
}

/// Register a new task created at `time`
pub fn create_task<S: StorageContext + ?Sized>(
    storage: &mut S,
    task: &ChainTask,
    time: Timestamp,
) -> RuntimeResult<()> {
    if get_task(storage, task.id)?.is_some() {
        return Err(RuntimeError::Duplicate {
            kind: "task",
            name: task.id.to_string(),
        });
    }
    if task.gas_limit == 0 {
        return Err(RuntimeError::Invalid("task gas limit".into()));
    }
    if task.mode != TaskFrequencyMode::Always && task.frequency == 0 {
        return Err(RuntimeError::Invalid("task frequency".into()));
    }
    tasks().set_value(storage, &task.id.to_be_bytes(), task)?;
    let run = TaskRun {
        height: task.height,
        time,
        runs: 0,
    };
    runs().set_value(storage, &task.id.to_be_bytes(), &run)?;
    Ok(())
}

/// Deactivate a task. History is kept.
pub fn stop_task<S: StorageContext + ?Sized>(storage: &mut S, id: u64, caller: &Address) -> RuntimeResult<()> {
    let mut task = task(storage, id)?;
    if task.owner != *caller {
        return Err(RuntimeError::NotAuthorized(format!("{caller} does not own task {id}")));
    }
    deactivate(storage, &mut task)
}

pub(crate) fn deactivate<S: StorageContext + ?Sized>(storage: &mut S, task: &mut ChainTask) -> RuntimeResult<()> {
    task.active = false;
    tasks().set_value(storage, &task.id.to_be_bytes(), task)?;
    Ok(())
}

/// Active tasks in id order
pub fn active_tasks<S: StorageReader + ?Sized>(storage: &S) -> RuntimeResult<Vec<ChainTask>> {
    tasks()
        .entries(storage)?
        .iter()
        .map(|(_, bytes)| Ok(ChainTask::from_bytes(bytes)?))
        .filter(|task: &RuntimeResult<ChainTask>| task.as_ref().map_or(true, |t| t.active))
        .collect()
}

/// Last run of task `id`
pub fn last_run<S: StorageReader + ?Sized>(storage: &S, id: u64) -> RuntimeResult<TaskRun> {
    runs()
        .get_value(storage, &id.to_be_bytes())?
        .ok_or(RuntimeError::UnknownTask(id))
}

/// Record a run of task `id` at `height`
pub fn record_run<S: StorageContext + ?Sized>(
    storage: &mut S,
    id: u64,
    height: BlockHeight,
    time: Timestamp,
) -> RuntimeResult<()> {
    let previous = last_run(storage, id)?;
    let run = TaskRun {
        height,
        time,
        runs: previous.runs + 1,
    };
    runs().set_value(storage, &id.to_be_bytes(), &run)?;
    Ok(())
}

/// Whether `task` should run in the block at `height`.
///
/// A task never runs in the block that created it and at most once per
/// block. The first run waits for `delay`, later runs for `frequency`, both
/// measured in the unit of the task's mode; `Always` runs every block once
/// the delay has passed.
pub fn is_due(task: &ChainTask, last: &TaskRun, height: BlockHeight, time: Timestamp) -> bool {
    if !task.active || height <= last.height {
        return false;
    }
    let elapsed = match task.mode {
        TaskFrequencyMode::Time => u64::from(time.saturating_sub(last.time)),
        TaskFrequencyMode::Always | TaskFrequencyMode::Blocks => height - last.height,
    };
    let required = if last.runs == 0 {
        u64::from(task.delay)
    } else {
        match task.mode {
            TaskFrequencyMode::Always => 1,
            _ => u64::from(task.frequency),
        }
    };
    elapsed >= required
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_crypto::address_from_name;
    use strata_storage::{MemoryStore, StorageChangeSet};

    fn sample(mode: TaskFrequencyMode, frequency: u32, delay: u32) -> ChainTask {
        ChainTask {
            id: 7,
            owner: address_from_name("owner"),
            context_name: "dex".into(),
            method: "Tick".into(),
            frequency,
            delay,
            mode,
            gas_limit: 1_000,
            height: 10,
            active: true,
        }
    }

    fn created(height: BlockHeight, time: Timestamp) -> TaskRun {
        TaskRun { height, time, runs: 0 }
    }

    #[test]
    fn test_always_runs_every_block_after_creation() {
        let task = sample(TaskFrequencyMode::Always, 0, 0);
        assert!(!is_due(&task, &created(10, 100), 10, 100));
        assert!(is_due(&task, &created(10, 100), 11, 101));
        let ran = TaskRun { height: 11, time: 101, runs: 1 };
        assert!(!is_due(&task, &ran, 11, 101));
        assert!(is_due(&task, &ran, 12, 102));
    }

    #[test]
    fn test_blocks_mode_waits_for_delay_then_frequency() {
        let task = sample(TaskFrequencyMode::Blocks, 3, 2);
        assert!(!is_due(&task, &created(10, 0), 11, 0));
        assert!(is_due(&task, &created(10, 0), 12, 0));
        let ran = TaskRun { height: 12, time: 0, runs: 1 };
        assert!(!is_due(&task, &ran, 14, 0));
        assert!(is_due(&task, &ran, 15, 0));
    }

    #[test]
    fn test_time_mode_uses_seconds() {
        let task = sample(TaskFrequencyMode::Time, 60, 0);
        let ran = TaskRun { height: 11, time: 1_000, runs: 1 };
        assert!(!is_due(&task, &ran, 12, 1_059));
        assert!(is_due(&task, &ran, 12, 1_060));
    }

    #[test]
    fn test_stop_keeps_history() {
        let store = MemoryStore::new();
        let mut changes = StorageChangeSet::new(&store);
        let task = sample(TaskFrequencyMode::Always, 0, 0);
        create_task(&mut changes, &task, 100).unwrap();
        assert_eq!(active_tasks(&changes).unwrap().len(), 1);

        assert!(stop_task(&mut changes, 7, &address_from_name("stranger")).is_err());
        stop_task(&mut changes, 7, &task.owner).unwrap();
        assert!(active_tasks(&changes).unwrap().is_empty());
        assert!(!get_task(&changes, 7).unwrap().unwrap().active);
        assert_eq!(last_run(&changes, 7).unwrap().runs, 0);
    }
}
