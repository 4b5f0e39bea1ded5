use serde::{Deserialize, Serialize};

use crate::types::TaskCategory;

/// Values within this distance of the column maximum count as best
pub const BEST_TOLERANCE: f64 = 1e-9;

/// Arithmetic mean; an empty slice has no mean
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Summary statistics of one model on one benchmark
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub label: String,
    /// Mean per category, in the order requested; `None` when no task of
    /// the category had data
    pub category_means: Vec<(TaskCategory, Option<f64>)>,
    /// Mean over every task with data, regardless of category
    pub task_mean: Option<f64>,
    /// Mean of the non-empty category means
    pub type_mean: Option<f64>,
}

impl SummaryRow {
    pub fn category_mean(&self, category: TaskCategory) -> Option<f64> {
        self.category_means
            .iter()
            .find(|(c, _)| *c == category)
            .and_then(|(_, m)| *m)
    }

    /// Category means followed by the task mean and the type mean
    pub fn columns(&self) -> Vec<Option<f64>> {
        self.category_means
            .iter()
            .map(|(_, m)| *m)
            .chain([self.task_mean, self.type_mean])
            .collect()
    }
}

/// Summarize resolved task scores grouped by category.
///
/// Missing results must already be left out of `scores`: they are "no
/// data", never zero, and a category without data does not pull the
/// type mean down.
pub fn summarize(label: impl Into<String>, scores: &[(TaskCategory, Vec<f64>)]) -> SummaryRow {
    let category_means: Vec<(TaskCategory, Option<f64>)> = scores
        .iter()
        .map(|(category, values)| (*category, mean(values)))
        .collect();

    let all: Vec<f64> = scores.iter().flat_map(|(_, v)| v.iter().copied()).collect();
    let present: Vec<f64> = category_means.iter().filter_map(|(_, m)| *m).collect();

    SummaryRow {
        label: label.into(),
        category_means,
        task_mean: mean(&all),
        type_mean: mean(&present),
    }
}

/// Mark the best entries of a column.
///
/// An entry is best when it is present, positive, and within `tolerance`
/// of the column maximum, so near-ties are all marked.
pub fn best_flags(column: &[Option<f64>], tolerance: f64) -> Vec<bool> {
    let max = column
        .iter()
        .flatten()
        .copied()
        .filter(|v| *v > 0.0)
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))));

    column
        .iter()
        .map(|value| match (value, max) {
            (Some(v), Some(max)) => *v > 0.0 && *v >= max - tolerance,
            _ => false,
        })
        .collect()
}

/// Best flags for every column of a row-major table
pub fn best_by_column(rows: &[Vec<Option<f64>>], tolerance: f64) -> Vec<Vec<bool>> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut flags: Vec<Vec<bool>> = rows.iter().map(|r| vec![false; r.len()]).collect();

    for col in 0..width {
        let column: Vec<Option<f64>> = rows.iter().map(|r| r.get(col).copied().flatten()).collect();
        for (row, best) in best_flags(&column, tolerance).into_iter().enumerate() {
            if let Some(cell) = flags[row].get_mut(col) {
                *cell = best;
            }
        }
    }
    flags
}
