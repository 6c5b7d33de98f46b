use clap::ValueEnum;
use rand::distributions::{Alphanumeric, DistString};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::client::Record;
use crate::error::Operation;

#[derive(Debug, Clone, Copy, ValueEnum, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoadPattern {
    Sequential,
    Random,
}

/// A read/update mix over `user<N>` records with `field<N>` columns.
#[derive(Debug, Clone, Serialize)]
pub struct Workload {
    pub record_count: u32,
    pub operation_count: u32,
    pub read_proportion: f32,
    pub field_count: u32,
    pub field_length: usize,
    pub load_pattern: LoadPattern,
}

impl Workload {
    pub fn key(index: u32) -> String {
        format!("user{index}")
    }

    pub fn field_name(index: u32) -> String {
        format!("field{index}")
    }

    /// Insert order for the initial load.
    pub fn load_order(&self) -> Vec<u32> {
        let mut indices: Vec<u32> = (0..self.record_count).collect();
        if self.load_pattern == LoadPattern::Random {
            indices.shuffle(&mut rand::thread_rng());
        }
        indices
    }

    /// Every field filled with random alphanumeric text.
    pub fn build_record<R: Rng>(&self, rng: &mut R) -> Record {
        (0..self.field_count)
            .map(|i| (Self::field_name(i), self.random_value(rng)))
            .collect()
    }

    /// One random field, as a single-column update.
    pub fn build_update<R: Rng>(&self, rng: &mut R) -> Record {
        let field = rng.gen_range(0..self.field_count.max(1));
        [(Self::field_name(field), self.random_value(rng))]
            .into_iter()
            .collect()
    }

    pub fn next_key<R: Rng>(&self, rng: &mut R) -> String {
        Self::key(rng.gen_range(0..self.record_count.max(1)))
    }

    pub fn next_operation<R: Rng>(&self, rng: &mut R) -> Operation {
        if rng.gen::<f32>() < self.read_proportion {
            Operation::Read
        } else {
            Operation::Update
        }
    }

    fn random_value<R: Rng>(&self, rng: &mut R) -> Vec<u8> {
        Alphanumeric
            .sample_string(rng, self.field_length)
            .into_bytes()
    }
}
