use std::collections::BTreeMap;

use ahash::AHashMap;

use crate::{
    aggregation::Aggregator,
    data::{Attachments, ViewData, WindowData},
    time::Timestamp,
    tuple::TagTuple,
    view::View,
};

/// Aggregates everything recorded since the window started, with one long-lived aggregator per tag tuple.
pub(crate) struct CumulativeMaterializer {
    view: View,
    start: Timestamp,
    aggregators: AHashMap<TagTuple, Aggregator>,
}

impl CumulativeMaterializer {
    pub fn new(view: View, start: Timestamp) -> Self {
        Self {
            view,
            start,
            aggregators: AHashMap::new(),
        }
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn record(&mut self, tuple: TagTuple, value: f64, attachments: &Attachments, timestamp: Timestamp) {
        let aggregation = self.view.aggregation();
        self.aggregators
            .entry(tuple)
            .or_insert_with(|| Aggregator::new(aggregation))
            .add(value, attachments, timestamp);
    }

    pub fn snapshot(&self, now: Timestamp) -> ViewData {
        let kind = self.view.measure().kind();
        let data = self
            .aggregators
            .iter()
            .map(|(tuple, aggregator)| (tuple.clone(), aggregator.to_data(kind)))
            .collect::<BTreeMap<_, _>>();

        ViewData::new(
            self.view.clone(),
            data,
            WindowData::Cumulative {
                start: self.start,
                end: now,
            },
        )
    }

    pub fn clear_stats(&mut self) {
        self.aggregators.clear();
    }

    pub fn resume_stats_collection(&mut self, now: Timestamp) {
        self.start = now;
    }
}
