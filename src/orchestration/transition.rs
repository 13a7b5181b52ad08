//! Phase transition fold.
//!
//! Builds the next phase's input by running the finished phase's
//! `transform_file` over every file of the current list, paired with the task
//! whose input key matches the file's storage key.
//!
//! Storage keys stay unique across the output: a transformed file whose key
//! was already emitted is dropped with a warning, the earliest file wins.

use std::collections::{HashMap, HashSet};
use tracing::warn;

use crate::models::{ProcessableFile, Task};
use crate::phases::Phase;

/// Fold `phase.transform_file` over `files` in order
pub fn apply_transform<'a, P, I>(phase: &P, files: &[ProcessableFile], tasks: I) -> Vec<ProcessableFile>
where
    P: Phase + ?Sized,
    I: IntoIterator<Item = &'a Task>,
{
    let by_input: HashMap<&str, &Task> = tasks
        .into_iter()
        .map(|task| (task.input_key.as_str(), task))
        .collect();

    let mut seen = HashSet::with_capacity(files.len());
    let mut next = Vec::with_capacity(files.len());
    for file in files {
        for output in phase.transform_file(file, by_input.get(file.key.as_str()).copied()) {
            if seen.insert(output.key.clone()) {
                next.push(output);
            } else {
                warn!(
                    phase = %phase.id(),
                    key = %output.key,
                    source_key = %file.key,
                    "Dropping transformed file with a duplicate storage key"
                );
            }
        }
    }
    next
}
