//! CSV reporting of sweep results.
//!
//! Each evaluated configuration contributes one pooled row (relation `all`)
//! and one row per relation, all carrying the hyperparameters that produced
//! them so the file is self-describing when configurations are compared.

use std::fs::File;
use std::path::Path;

use serde::Serialize;

use crate::dictionary::Dictionary;
use crate::error::Result;
use crate::evaluation::{EvaluationReport, RankMetrics};

/// One line of the metrics report. Hits columns are percentages.
#[derive(Debug, Clone, Serialize)]
pub struct ReportRow {
    pub relation: String,
    pub embedding_size: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    pub num_skips: usize,
    pub num_sampled: usize,
    pub batch_size_sg: usize,
    pub mean_rank: f64,
    pub mrr: f64,
    pub hits_top_10: f64,
    pub hits_top_3: f64,
    pub hits_top_1: f64,
}

impl ReportRow {
    /// Copy of this row with the relation label and metric columns replaced.
    pub fn with_metrics(&self, relation: impl Into<String>, metrics: &RankMetrics) -> Self {
        Self {
            relation: relation.into(),
            mean_rank: metrics.mean_rank,
            mrr: metrics.mrr,
            hits_top_10: metrics.hits_at_10,
            hits_top_3: metrics.hits_at_3,
            hits_top_1: metrics.hits_at_1,
            ..self.clone()
        }
    }
}

/// Expand an evaluation into report rows: the pooled `all` row first, then
/// one row per relation in id order, labelled through the dictionary.
pub fn expand_report(
    base: &ReportRow,
    report: &EvaluationReport,
    relations: &Dictionary,
) -> Vec<ReportRow> {
    let mut rows = vec![base.with_metrics("all", &report.all)];
    let mut ids: Vec<usize> = report.per_relation.keys().copied().collect();
    ids.sort_unstable();
    for id in ids {
        let label = relations
            .label(id)
            .map(str::to_owned)
            .unwrap_or_else(|| id.to_string());
        rows.push(base.with_metrics(label, &report.per_relation[&id]));
    }
    rows
}

/// Incremental CSV writer for sweep results.
#[derive(Debug)]
pub struct MetricsReport {
    writer: csv::Writer<File>,
}

impl MetricsReport {
    /// Create (or truncate) the report file at `path`.
    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self {
            writer: csv::Writer::from_writer(File::create(path)?),
        })
    }

    /// Append rows and flush, so partial sweeps still leave a readable file.
    pub fn write_rows(&mut self, rows: &[ReportRow]) -> Result<()> {
        for row in rows {
            self.writer.serialize(row)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_row() -> ReportRow {
        ReportRow {
            relation: String::new(),
            embedding_size: 32,
            batch_size: 64,
            learning_rate: 0.01,
            num_skips: 2,
            num_sampled: 8,
            batch_size_sg: 128,
            mean_rank: 0.0,
            mrr: 0.0,
            hits_top_10: 0.0,
            hits_top_3: 0.0,
            hits_top_1: 0.0,
        }
    }

    fn toy_report() -> EvaluationReport {
        let mut per_relation = HashMap::new();
        per_relation.insert(1, RankMetrics::from_ranks(&[2, 4]));
        per_relation.insert(0, RankMetrics::from_ranks(&[1, 1, 3, 7]));
        EvaluationReport {
            all: RankMetrics::from_ranks(&[1, 1, 2, 3, 4, 7]),
            per_relation,
        }
    }

    #[test]
    fn test_expand_orders_relations_after_all() {
        let mut relations = Dictionary::new();
        relations.update(["knows".to_owned(), "likes".to_owned()]);
        let rows = expand_report(&base_row(), &toy_report(), &relations);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].relation, "all");
        // id order, labelled through the dictionary
        assert_eq!(rows[1].relation, relations.label(0).unwrap());
        assert_eq!(rows[2].relation, relations.label(1).unwrap());
        assert_eq!(rows[0].embedding_size, 32);
    }

    #[test]
    fn test_unknown_relation_falls_back_to_id() {
        let relations = Dictionary::new();
        let rows = expand_report(&base_row(), &toy_report(), &relations);
        assert_eq!(rows[1].relation, "0");
    }

    #[test]
    fn test_csv_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        let mut report = MetricsReport::create(&path).unwrap();
        let rows = vec![base_row().with_metrics("all", &RankMetrics::from_ranks(&[1, 2]))];
        report.write_rows(&rows).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "relation");
        assert_eq!(&headers[7], "mean_rank");
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(&record[0], "all");
        assert_eq!(&record[7], "1.5");
    }
}
