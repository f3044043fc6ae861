use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use tally_context::TagContext;
use tracing::{debug, trace};

use crate::{
    data::{Attachments, ViewData},
    error::RegistrationError,
    materializer::Materializer,
    measure::{Measure, Measurement},
    telemetry::Telemetry,
    time::Timestamp,
    tuple::TagTuple,
    view::{View, ViewName, Window},
};

/// Outcome of a successful view registration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Registration {
    /// The view was newly registered.
    Registered,

    /// An identical view was already registered, and nothing changed.
    AlreadyRegistered,
}

/// Registered views and measures, and the materializers holding their aggregated data.
///
/// The registry itself does no synchronization. The engine guards it with a single lock, held for registration,
/// snapshots, and each batch applied by the recording worker.
pub(crate) struct ViewRegistry {
    interval_bucket_count: usize,
    measures: AHashMap<String, Measure>,
    views_by_measure: AHashMap<String, Vec<ViewName>>,
    materializers: AHashMap<ViewName, Materializer>,
    exportable_views: Option<Arc<[View]>>,
    telemetry: Telemetry,
}

impl ViewRegistry {
    pub fn new(interval_bucket_count: usize, telemetry: Telemetry) -> Self {
        Self {
            interval_bucket_count,
            measures: AHashMap::new(),
            views_by_measure: AHashMap::new(),
            materializers: AHashMap::new(),
            exportable_views: None,
            telemetry,
        }
    }

    /// Registers a view whose window starts at `now`.
    ///
    /// Registering a view identical to one already registered is a no-op, and does not reset its aggregated data.
    pub fn register_view(&mut self, view: View, now: Timestamp) -> Result<Registration, RegistrationError> {
        if let Some(existing) = self.materializers.get(view.name()) {
            if existing.view() == &view {
                return Ok(Registration::AlreadyRegistered);
            }
            return Err(RegistrationError::ConflictingView {
                name: view.name().to_string(),
            });
        }

        let measure = view.measure();
        match self.measures.get(measure.name()) {
            Some(existing) if existing != measure => {
                return Err(RegistrationError::ConflictingMeasure {
                    name: measure.name().to_string(),
                })
            }
            Some(_) => {}
            None => {
                self.measures.insert(measure.name().to_string(), measure.clone());
            }
        }

        debug!(
            view = %view.name(),
            measure = measure.name(),
            aggregation = view.aggregation().kind_name(),
            window = ?view.window(),
            "Registered view."
        );

        self.views_by_measure
            .entry(measure.name().to_string())
            .or_default()
            .push(view.name().clone());
        self.materializers.insert(
            view.name().clone(),
            Materializer::new(view, now, self.interval_bucket_count),
        );
        self.exportable_views = None;
        self.telemetry.set_registered_views(self.materializers.len());

        Ok(Registration::Registered)
    }

    /// Returns the registered view with the given name.
    pub fn view(&self, name: &str) -> Option<&View> {
        self.materializers.get(name).map(Materializer::view)
    }

    /// Returns the names of every measure consumed by at least one view that rejects negative values.
    pub fn measures_rejecting_negative_values(&self) -> AHashSet<String> {
        self.materializers
            .values()
            .map(Materializer::view)
            .filter(|view| view.aggregation().rejects_negative_values())
            .map(|view| view.measure().name().to_string())
            .collect()
    }

    /// Returns `true` if at least one view consuming the given measure rejects negative values.
    pub fn rejects_negative_values(&self, measure: &str) -> bool {
        self.views_by_measure.get(measure).is_some_and(|view_names| {
            view_names
                .iter()
                .filter_map(|name| self.materializers.get(name))
                .any(|materializer| materializer.view().aggregation().rejects_negative_values())
        })
    }

    /// Folds a batch of measurements into every view that consumes them.
    ///
    /// Measurements for measures with no registered views, or for a measure that differs from the one registered under
    /// the same name, are skipped.
    pub fn record(
        &mut self, tags: &TagContext, measurements: &[Measurement], attachments: &Attachments, timestamp: Timestamp,
    ) {
        let mut applied = 0;

        for measurement in measurements {
            let measure = measurement.measure();
            match self.measures.get(measure.name()) {
                Some(registered) if registered == measure => {}
                Some(_) => {
                    trace!(measure = measure.name(), "Skipping measurement for conflicting measure definition.");
                    continue;
                }
                None => continue,
            }

            let Some(view_names) = self.views_by_measure.get(measure.name()) else {
                continue;
            };

            for view_name in view_names {
                if let Some(materializer) = self.materializers.get_mut(view_name) {
                    let tuple = TagTuple::project(tags, materializer.view().columns());
                    materializer.record(tuple, measurement.value(), attachments, timestamp, &self.telemetry);
                    applied += 1;
                }
            }
        }

        self.telemetry.increment_measurements_applied(applied);
    }

    /// Takes a snapshot of the view with the given name.
    pub fn snapshot(&mut self, name: &str, now: Timestamp) -> Option<ViewData> {
        self.materializers
            .get_mut(name)
            .map(|materializer| materializer.snapshot(now))
    }

    /// Returns every registered view with a cumulative window, ordered by name.
    pub fn exportable_views(&mut self) -> Arc<[View]> {
        if let Some(views) = &self.exportable_views {
            return Arc::clone(views);
        }

        let mut views = self
            .materializers
            .values()
            .map(Materializer::view)
            .filter(|view| view.window() == Window::Cumulative)
            .cloned()
            .collect::<Vec<_>>();
        views.sort_by(|a, b| a.name().cmp(b.name()));

        let views: Arc<[View]> = views.into();
        self.exportable_views = Some(Arc::clone(&views));
        views
    }

    pub fn clear_stats(&mut self) {
        for materializer in self.materializers.values_mut() {
            materializer.clear_stats();
        }
    }

    pub fn resume_stats_collection(&mut self, now: Timestamp) {
        for materializer in self.materializers.values_mut() {
            materializer.resume_stats_collection(now);
        }
    }
}
