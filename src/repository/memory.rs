//! In-memory repositories used by the CLI and the tests

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error};

use super::{RecordRepository, Result, ResultRepository, ScriptRepository};
use crate::compiler::TemplateCompiler;
use crate::error::ScriptError;
use crate::execution::ScriptConsumer;
use crate::model::{EvaluationResult, RecordId, ResultId, Script, ScriptId};
use crate::modules::ModuleCache;

/// Rows keyed by id, with ids assigned from 1 upwards
#[derive(Debug)]
struct Table<T> {
    next_id: i64,
    rows: BTreeMap<i64, T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            next_id: 1,
            rows: BTreeMap::new(),
        }
    }
}

impl<T> Table<T> {
    /// Use `requested` when positive and free, otherwise the next id
    fn assign_id(&mut self, requested: i64) -> i64 {
        let id = if requested > 0 && !self.rows.contains_key(&requested) {
            requested
        } else {
            self.next_id
        };
        self.next_id = self.next_id.max(id + 1);
        id
    }
}

fn read<T>(lock: &RwLock<Table<T>>) -> Result<RwLockReadGuard<'_, Table<T>>> {
    lock.read()
        .map_err(|_| ScriptError::Repository("table lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<Table<T>>) -> Result<RwLockWriteGuard<'_, Table<T>>> {
    lock.write()
        .map_err(|_| ScriptError::Repository("table lock poisoned".to_string()))
}

/// Records of consumer type `C`
#[derive(Debug)]
pub struct MemoryRecordRepository<C> {
    table: RwLock<Table<C>>,
}

impl<C> Default for MemoryRecordRepository<C> {
    fn default() -> Self {
        Self {
            table: RwLock::new(Table::default()),
        }
    }
}

impl<C: ScriptConsumer + Clone> MemoryRecordRepository<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A repository pre-filled with `records`, keyed by their own ids
    pub fn with_records(records: impl IntoIterator<Item = C>) -> Result<Self> {
        let repository = Self::default();
        for record in records {
            repository.add(record)?;
        }
        Ok(repository)
    }
}

impl<C: ScriptConsumer + Clone> RecordRepository<C> for MemoryRecordRepository<C> {
    fn get_all(&self) -> Result<Vec<C>> {
        Ok(read(&self.table)?.rows.values().cloned().collect())
    }

    fn get_by_id(&self, id: RecordId) -> Result<Option<C>> {
        Ok(read(&self.table)?.rows.get(&id).cloned())
    }

    fn add(&self, record: C) -> Result<RecordId> {
        let id = record.record_id();
        let mut table = write(&self.table)?;
        if id <= 0 || table.rows.contains_key(&id) {
            return Err(ScriptError::Repository(format!(
                "record id {} is invalid or already taken",
                id
            )));
        }
        table.rows.insert(id, record);
        Ok(id)
    }

    fn delete(&self, id: RecordId) -> Result<usize> {
        Ok(write(&self.table)?.rows.remove(&id).map_or(0, |_| 1))
    }
}

/// Scripts compiled for consumer type `C`
pub struct MemoryScriptRepository<C> {
    compiler: TemplateCompiler,
    cache: Arc<ModuleCache>,
    table: RwLock<Table<Script>>,
    _consumer: PhantomData<fn() -> C>,
}

impl<C: ScriptConsumer> MemoryScriptRepository<C> {
    pub fn new(compiler: TemplateCompiler, cache: Arc<ModuleCache>) -> Self {
        Self {
            compiler,
            cache,
            table: RwLock::new(Table::default()),
            _consumer: PhantomData,
        }
    }

    fn compile(&self, script: &mut Script) -> Result<()> {
        match self.compiler.compile::<C>(&script.source) {
            Ok(compiled) => {
                script.apply(compiled);
                Ok(())
            }
            Err(e) => {
                error!(
                    operation = "compile",
                    status = "error",
                    script = %script.name,
                    "{}",
                    e
                );
                Err(e.into())
            }
        }
    }
}

impl<C: ScriptConsumer> ScriptRepository for MemoryScriptRepository<C> {
    fn get_all(&self) -> Result<Vec<Script>> {
        Ok(read(&self.table)?
            .rows
            .values()
            .map(|script| Script {
                binary: None,
                ..script.clone()
            })
            .collect())
    }

    fn get_by_id(&self, id: ScriptId, with_binary: bool) -> Result<Option<Script>> {
        Ok(read(&self.table)?.rows.get(&id).map(|script| {
            let mut script = script.clone();
            if !with_binary {
                script.binary = None;
            }
            script
        }))
    }

    fn add(&self, mut script: Script) -> Result<ScriptId> {
        self.compile(&mut script)?;

        let mut table = write(&self.table)?;
        let id = table.assign_id(script.id);
        script.id = id;
        table.rows.insert(id, script);
        debug!(script_id = id, "Stored script");
        Ok(id)
    }

    fn update(&self, mut script: Script) -> Result<usize> {
        self.compile(&mut script)?;

        let mut table = write(&self.table)?;
        let Some(stored) = table.rows.get_mut(&script.id) else {
            return Ok(0);
        };
        self.cache.invalidate(C::TYPE_ID, stored.script_hash);
        *stored = script;
        Ok(1)
    }

    fn delete(&self, id: ScriptId) -> Result<usize> {
        let removed = write(&self.table)?.rows.remove(&id);
        Ok(removed.map_or(0, |script| {
            self.cache.invalidate(C::TYPE_ID, script.script_hash);
            1
        }))
    }
}

#[derive(Debug, Default)]
pub struct MemoryResultRepository {
    table: RwLock<Table<EvaluationResult>>,
}

impl MemoryResultRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        read(&self.table).map_or(0, |table| table.rows.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultRepository for MemoryResultRepository {
    fn get_all(&self, script_id: ScriptId) -> Result<Vec<EvaluationResult>> {
        Ok(read(&self.table)?
            .rows
            .values()
            .filter(|result| result.script_id == script_id)
            .cloned()
            .collect())
    }

    fn get_by_id(&self, id: ResultId) -> Result<Option<EvaluationResult>> {
        Ok(read(&self.table)?.rows.get(&id).cloned())
    }

    fn add(&self, mut result: EvaluationResult) -> Result<ResultId> {
        let mut table = write(&self.table)?;
        let id = table.assign_id(0);
        result.id = id;
        table.rows.insert(id, result);
        Ok(id)
    }

    fn add_bulk(&self, results: Vec<EvaluationResult>) -> Result<()> {
        // one write lock for the whole batch
        let mut table = write(&self.table)?;
        for mut result in results {
            let id = table.assign_id(0);
            result.id = id;
            table.rows.insert(id, result);
        }
        Ok(())
    }

    fn delete(&self, id: ResultId) -> Result<usize> {
        Ok(write(&self.table)?.rows.remove(&id).map_or(0, |_| 1))
    }

    fn delete_all(&self, script_id: ScriptId) -> Result<usize> {
        let mut table = write(&self.table)?;
        let before = table.rows.len();
        table.rows.retain(|_, result| result.script_id != script_id);
        Ok(before - table.rows.len())
    }
}
