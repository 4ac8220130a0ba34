//! Evaluation orchestrator
//!
//! Runs a compiled script over every record of a dataset and persists the
//! produced values with a single bulk write. Records are evaluated one at a
//! time; the first failing record aborts the run and nothing is persisted.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::EvaluationConfig;
use crate::error::ScriptError;
use crate::execution::{self, ScriptConsumer};
use crate::model::{EvaluationResult, RecordId, Script};
use crate::modules::ModuleCache;
use crate::repository::{RecordRepository, ResultRepository};

/// Evaluates scripts of consumer type `C` over the records in `R`, storing outputs in `W`
pub struct EvaluationService<C, R, W> {
    records: Arc<R>,
    results: Arc<W>,
    cache: Arc<ModuleCache>,
    evaluation: EvaluationConfig,
    _consumer: PhantomData<fn() -> C>,
}

impl<C, R, W> EvaluationService<C, R, W>
where
    C: ScriptConsumer,
    R: RecordRepository<C>,
    W: ResultRepository,
{
    pub fn new(
        records: Arc<R>,
        results: Arc<W>,
        cache: Arc<ModuleCache>,
        evaluation: EvaluationConfig,
    ) -> Self {
        Self {
            records,
            results,
            cache,
            evaluation,
            _consumer: PhantomData,
        }
    }

    /// Evaluate `script` against every record and persist the results
    ///
    /// Returns the value of every record that produced one. Records whose
    /// script returned nothing are absent from the map and from storage.
    pub async fn evaluate(
        &self,
        script: &Script,
    ) -> Result<BTreeMap<RecordId, serde_json::Value>, ScriptError> {
        script.compiled_binary()?;

        let start = Instant::now();
        let records = self.records.get_all()?;
        if records.is_empty() {
            info!(script_id = script.id, "No records to evaluate");
            return Ok(BTreeMap::new());
        }
        info!(
            operation = "load_records",
            count = records.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "records loaded"
        );

        let deadline = self.evaluation.resolve_timeout();
        let evaluate_start = Instant::now();
        let mut values = BTreeMap::new();

        for record in &records {
            let module = self.cache.resolve(C::TYPE_ID, script)?;
            if let Some(value) = execution::evaluate(module, record.context(), deadline).await? {
                values.insert(record.record_id(), value);
            }
        }

        info!(
            operation = "evaluate",
            status = "success",
            script_id = script.id,
            records = records.len(),
            values = values.len(),
            duration_ms = evaluate_start.elapsed().as_millis() as u64,
            "records evaluated"
        );

        if values.is_empty() {
            debug!(script_id = script.id, "Script produced no values; nothing to persist");
            return Ok(values);
        }

        let persist_start = Instant::now();
        let rows: Vec<EvaluationResult> = values
            .iter()
            .map(|(record_id, value)| EvaluationResult {
                id: 0,
                record_id: *record_id,
                script_id: script.id,
                result: value.to_string(),
            })
            .collect();
        let count = rows.len();
        self.results.add_bulk(rows)?;

        info!(
            operation = "persist",
            status = "success",
            script_id = script.id,
            count,
            duration_ms = persist_start.elapsed().as_millis() as u64,
            "results stored"
        );

        Ok(values)
    }
}
