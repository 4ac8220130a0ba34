pub mod memory;

pub use memory::{MemoryRecordRepository, MemoryResultRepository, MemoryScriptRepository};

use crate::error::ScriptError;
use crate::execution::ScriptConsumer;
use crate::model::{EvaluationResult, RecordId, ResultId, Script, ScriptId};

pub type Result<T> = std::result::Result<T, ScriptError>;

/// Source of the records a script is evaluated against
pub trait RecordRepository<C: ScriptConsumer>: Send + Sync {
    /// Every record of the dataset; order is irrelevant
    fn get_all(&self) -> Result<Vec<C>>;

    fn get_by_id(&self, id: RecordId) -> Result<Option<C>>;

    /// Store a record, returning its id
    fn add(&self, record: C) -> Result<RecordId>;

    /// Delete a record, returning the number of rows removed
    fn delete(&self, id: RecordId) -> Result<usize>;
}

/// Script storage; compiles on write and keeps the module cache coherent
pub trait ScriptRepository: Send + Sync {
    /// Every script, without binaries
    fn get_all(&self) -> Result<Vec<Script>>;

    fn get_by_id(&self, id: ScriptId, with_binary: bool) -> Result<Option<Script>>;

    /// Compile and store a new script, returning its id
    ///
    /// Nothing is stored when compilation fails.
    fn add(&self, script: Script) -> Result<ScriptId>;

    /// Recompile and replace an existing script
    ///
    /// The cached module of the previously stored hash is invalidated.
    /// Returns the number of rows updated.
    fn update(&self, script: Script) -> Result<usize>;

    fn delete(&self, id: ScriptId) -> Result<usize>;
}

/// Persistence of evaluation outputs
pub trait ResultRepository: Send + Sync {
    fn get_all(&self, script_id: ScriptId) -> Result<Vec<EvaluationResult>>;

    fn get_by_id(&self, id: ResultId) -> Result<Option<EvaluationResult>>;

    fn add(&self, result: EvaluationResult) -> Result<ResultId>;

    /// Store all `results` in one atomic operation
    fn add_bulk(&self, results: Vec<EvaluationResult>) -> Result<()>;

    fn delete(&self, id: ResultId) -> Result<usize>;

    /// Delete every result of `script_id`, returning how many were removed
    fn delete_all(&self, script_id: ScriptId) -> Result<usize>;
}
