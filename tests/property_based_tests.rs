//! Property tests for the pure parts of the orchestrator: backoff bounds,
//! discovery and the transition fold.

use proptest::prelude::*;
use serde_json::json;

use pipeline_core::models::{task_id_for, ProcessableFile};
use pipeline_core::orchestration::{apply_transform, BackoffCalculator};
use pipeline_core::phases::{ConversionPhase, Phase, ProcessingPhase};
use pipeline_core::state_machine::PhaseId;

fn content_type_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("image/heic".to_string()),
        Just("image/jpeg".to_string()),
        Just("image/png".to_string()),
        Just("image/x-adobe-dng".to_string()),
        Just("application/pdf".to_string()),
        Just("application/octet-stream".to_string()),
        Just("text/plain".to_string()),
    ]
}

fn extension_strategy() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("heic"),
        Just("jpg"),
        Just("CR2"),
        Just("nef"),
        Just("pdf"),
        Just("txt"),
    ]
}

/// Files with unique keys
fn file_list_strategy() -> impl Strategy<Value = Vec<ProcessableFile>> {
    prop::collection::vec((content_type_strategy(), extension_strategy()), 0..24).prop_map(
        |specs| {
            specs
                .into_iter()
                .enumerate()
                .map(|(i, (content_type, ext))| ProcessableFile {
                    key: format!("uploads/{i}.{ext}"),
                    path: format!("/album/{i}.{ext}"),
                    name: format!("{i}.{ext}"),
                    content_type,
                    size: 100 + i as u64,
                    content_id: None,
                    processing_config: json!({"index": i}),
                    source_file_name: None,
                    tags: vec![],
                })
                .collect()
        },
    )
}

proptest! {
    /// Property: backoff never exceeds the cap and never shrinks with more attempts
    #[test]
    fn backoff_is_bounded_and_monotonic(
        base in 1u64..10_000,
        cap in 1u64..600_000,
        attempt in 0u32..200,
    ) {
        let backoff = BackoffCalculator::new(base, cap);
        let delay = backoff.delay_ms(attempt);
        prop_assert!(delay <= cap);
        prop_assert!(delay <= backoff.delay_ms(attempt + 1));
        if attempt < 20 && base * (1 << attempt) <= cap {
            prop_assert_eq!(delay, base * (1 << attempt));
        }
    }

    /// Property: discovery yields one task per eligible file with stable ids
    #[test]
    fn discovery_is_deterministic_and_keyed_by_input(files in file_list_strategy()) {
        for phase in [&ConversionPhase as &dyn Phase, &ProcessingPhase as &dyn Phase] {
            let tasks = phase.discover(&files);
            prop_assert!(tasks.len() <= files.len());
            for task in &tasks {
                prop_assert_eq!(&task.task_id, &task_id_for(phase.id(), &task.input_key));
                prop_assert!(files.iter().any(|f| f.key == task.input_key));
            }
            let again: Vec<_> = phase.discover(&files).into_iter().map(|t| t.task_id).collect();
            let first: Vec<_> = tasks.into_iter().map(|t| t.task_id).collect();
            prop_assert_eq!(first, again);
        }
    }

    /// Property: with no resolved tasks, the transition fold is the identity
    #[test]
    fn transform_without_results_preserves_file_list(files in file_list_strategy()) {
        for phase in [&ConversionPhase as &dyn Phase, &ProcessingPhase as &dyn Phase] {
            let pending = phase.discover(&files);
            let out = apply_transform(phase, &files, pending.iter());
            prop_assert_eq!(&out, &files);
        }
    }

    /// Property: conversion output never re-enters conversion
    #[test]
    fn converted_files_are_not_rediscovered(files in file_list_strategy()) {
        let tagged: Vec<_> = files
            .into_iter()
            .map(|f| f.with_tag(PhaseId::Conversion.produced_by_tag()))
            .collect();
        prop_assert!(ConversionPhase.discover(&tagged).is_empty());
    }
}
