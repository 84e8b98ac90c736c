//! Durable snapshots of model parameter tables.
//!
//! A checkpoint captures every embedding table of a model together with its
//! kind and shape, and can be restored into a freshly constructed model of
//! the same variant. Saves are blocking: when [`Checkpoint::save`] returns,
//! the snapshot is on disk.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::ModelKind;

/// Snapshot of a model's parameter tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Model variant the snapshot belongs to.
    pub kind: ModelKind,
    /// Embedding dimension.
    pub dim: usize,
    /// Entity embedding table, (num_entities, dim).
    pub entities: Array2<f32>,
    /// Relation embedding table, (num_relations, dim).
    pub relations: Array2<f32>,
    /// TransH hyperplane normals, (num_relations, dim).
    pub normals: Option<Array2<f32>>,
    /// TransEve auxiliary per-entity vectors, (num_entities, dim).
    pub auxiliary: Option<Array2<f32>>,
    /// RESCAL per-relation matrices, (num_relations, dim, dim).
    pub relation_matrices: Option<Array3<f32>>,
}

impl Checkpoint {
    /// Write the snapshot to `path` as JSON. Blocks until fully written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Read a snapshot previously written with [`Checkpoint::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}
