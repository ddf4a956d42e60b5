use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::models::separation::ModelVariant;
use crate::services::separator::{BackendError, SeparationBackend, SeparationModel};

type Slot = Arc<Mutex<Option<Arc<dyn SeparationModel>>>>;

/// Process-wide cache of loaded models, keyed by variant.
///
/// Loads are single-flight: each variant has its own slot lock, so the first
/// job to need a variant loads it while later jobs for that variant wait on
/// the slot. Jobs using other variants are not held up. A failed load leaves
/// the slot empty and the next job retries.
pub struct ModelCache {
    backend: Arc<dyn SeparationBackend>,
    slots: Mutex<HashMap<ModelVariant, Slot>>,
}

impl ModelCache {
    pub fn new(backend: Arc<dyn SeparationBackend>) -> Self {
        Self {
            backend,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Return the loaded model for `variant`, loading it on first use.
    pub fn acquire(&self, variant: ModelVariant) -> Result<Arc<dyn SeparationModel>, BackendError> {
        let slot = self.slots.lock().entry(variant).or_default().clone();

        let mut loaded = slot.lock();
        if let Some(model) = loaded.as_ref() {
            return Ok(Arc::clone(model));
        }

        let start = Instant::now();
        let model = self.backend.load(variant)?;
        tracing::info!(
            model = %variant,
            backend = self.backend.name(),
            load_ms = start.elapsed().as_millis() as u64,
            "Model loaded"
        );

        *loaded = Some(Arc::clone(&model));
        Ok(model)
    }

    /// Variants currently held in memory.
    pub fn loaded(&self) -> Vec<ModelVariant> {
        let slots: Vec<(ModelVariant, Slot)> = self
            .slots
            .lock()
            .iter()
            .map(|(variant, slot)| (*variant, Arc::clone(slot)))
            .collect();

        // try_lock: a slot that is mid-load is not loaded yet
        let mut variants: Vec<ModelVariant> = slots
            .into_iter()
            .filter(|(_, slot)| slot.try_lock().map(|m| m.is_some()).unwrap_or(false))
            .map(|(variant, _)| variant)
            .collect();
        variants.sort_by_key(|v| v.name());
        variants
    }
}
