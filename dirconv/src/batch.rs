//! Orchestration for `dirconv run`.
//!
//! Each ready subdirectory is processed to completion (stage, convert,
//! collect, unstage) before the next one starts.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::core::matcher::OutputMatcher;
use crate::core::types::{BatchCounts, BatchSummary, DirOutcome, DirStatus};
use crate::io::collect::{Collected, collect_outputs};
use crate::io::config::BatchConfig;
use crate::io::converter::{ConvertRequest, Converter};
use crate::io::discover::Candidate;
use crate::io::report::{RunPaths, timestamp, write_report};
use crate::io::stage::{ensure_helper, stage_helper, unstage_helper};
use crate::plan::{PlanStatus, build_plan};

/// Run the converter across every ready subdirectory of `root`.
///
/// Setup problems (invalid config, missing helper, unreadable root) abort with
/// an error before any directory is touched. Per-directory failures are recorded
/// in the returned summary and, unless `fail_fast` is set, do not stop the batch.
/// `on_dir` is called after each directory, including skipped ones.
pub fn run_batch<C: Converter, F: FnMut(&DirOutcome)>(
    root: &Path,
    cfg: &BatchConfig,
    converter: &C,
    mut on_dir: F,
) -> Result<BatchSummary> {
    cfg.validate()?;
    let helper = cfg.helper_path(root);
    ensure_helper(&helper)?;
    let matcher = cfg.output_matcher()?;
    let plan = build_plan(root, cfg)?;

    let started = Utc::now();
    let paths = RunPaths::allocate(root, started)?;
    info!(run_id = %paths.run_id, dirs = plan.len(), "starting batch");

    let ctx = DirContext {
        root,
        helper: &helper,
        cfg,
        matcher: &matcher,
        paths: &paths,
    };

    let mut outcomes = Vec::with_capacity(plan.len());
    let mut stopped_early = false;
    let total = plan.len();
    for (idx, entry) in plan.into_iter().enumerate() {
        let outcome = match entry.status {
            PlanStatus::Skip(reason) => {
                debug!(dir = %entry.candidate.name, reason = %reason, "skipping directory");
                DirOutcome::new(entry.candidate.name, DirStatus::Skipped).with_message(reason)
            }
            PlanStatus::Fail(reason) => {
                warn!(dir = %entry.candidate.name, reason = %reason, "directory failed preflight");
                DirOutcome::new(entry.candidate.name, DirStatus::Error).with_message(reason)
            }
            PlanStatus::Ready => process_dir(&ctx, &entry.candidate, converter),
        };
        on_dir(&outcome);
        let failed = outcome.status.is_failure();
        outcomes.push(outcome);
        if failed && cfg.fail_fast {
            stopped_early = idx + 1 < total;
            warn!(remaining = total - idx - 1, "stopping batch after failure");
            break;
        }
    }

    let summary = BatchSummary {
        run_id: paths.run_id.clone(),
        root: root.display().to_string(),
        started_at: timestamp(started),
        ended_at: timestamp(Utc::now()),
        stopped_early,
        counts: BatchCounts::tally(&outcomes),
        outcomes,
    };
    write_report(&paths, &summary).context("write run report")?;
    info!(
        run_id = %summary.run_id,
        converted = summary.counts.converted,
        failed = summary.counts.failed,
        "batch finished"
    );
    Ok(summary)
}

struct DirContext<'a> {
    root: &'a Path,
    helper: &'a Path,
    cfg: &'a BatchConfig,
    matcher: &'a OutputMatcher,
    paths: &'a RunPaths,
}

#[instrument(skip_all, fields(dir = %candidate.name))]
fn process_dir<C: Converter>(
    ctx: &DirContext<'_>,
    candidate: &Candidate,
    converter: &C,
) -> DirOutcome {
    let start = Instant::now();
    let mut outcome = match stage_and_convert(ctx, candidate, converter) {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "directory failed");
            DirOutcome::new(candidate.name.clone(), DirStatus::Error)
                .with_message(format!("{err:#}"))
        }
    };
    outcome.duration_ms = Some(start.elapsed().as_millis() as u64);
    outcome
}

fn stage_and_convert<C: Converter>(
    ctx: &DirContext<'_>,
    candidate: &Candidate,
    converter: &C,
) -> Result<DirOutcome> {
    let staged = stage_helper(ctx.helper, &candidate.path)?;
    let result = convert_and_collect(ctx, candidate, converter);
    if ctx.cfg.remove_helper
        && let Err(err) = unstage_helper(&staged)
    {
        warn!(err = %format!("{err:#}"), "failed to remove staged helper");
        return result.map(|mut outcome| {
            outcome.status = DirStatus::Error;
            outcome.message = Some(format!("{err:#}"));
            outcome
        });
    }
    result
}

fn convert_and_collect<C: Converter>(
    ctx: &DirContext<'_>,
    candidate: &Candidate,
    converter: &C,
) -> Result<DirOutcome> {
    let request = ConvertRequest {
        workdir: candidate.path.clone(),
        log_path: ctx.paths.log_path(&candidate.name),
        timeout: ctx.cfg.timeout(),
        output_limit_bytes: ctx.cfg.output_limit_bytes,
    };
    let output = converter.convert(&request)?;

    let name = candidate.name.clone();
    if output.timed_out {
        let mut outcome = DirOutcome::new(name, DirStatus::TimedOut).with_message(format!(
            "converter timed out after {}s",
            ctx.cfg.timeout_secs
        ));
        outcome.exit_code = output.exit_code;
        return Ok(outcome);
    }
    if !output.success {
        let message = match output.exit_code {
            Some(code) => format!("converter exited with status {code}"),
            None => "converter terminated by signal".to_string(),
        };
        let mut outcome = DirOutcome::new(name, DirStatus::ConverterFailed).with_message(message);
        outcome.exit_code = output.exit_code;
        return Ok(outcome);
    }

    let collected = collect_outputs(&candidate.path, ctx.root, ctx.matcher, ctx.cfg.overwrite)?;
    let status = if collected.has_leftovers() {
        DirStatus::Error
    } else if collected.moved.is_empty() {
        DirStatus::NoOutput
    } else {
        DirStatus::Converted
    };
    let mut outcome = DirOutcome::new(name, status);
    outcome.exit_code = output.exit_code;
    match status {
        DirStatus::Error => outcome.message = Some(leftover_message(&collected)),
        DirStatus::NoOutput => {
            outcome.message = Some(format!("no file matching {}", ctx.matcher.describe()));
        }
        _ => {}
    }
    outcome.collected = collected.moved;
    outcome.conflicts = collected.conflicts;
    Ok(outcome)
}

fn leftover_message(collected: &Collected) -> String {
    let mut parts = Vec::new();
    if !collected.conflicts.is_empty() {
        parts.push(format!(
            "output already exists in root: {}",
            collected.conflicts.join(", ")
        ));
    }
    for failed in &collected.failed {
        parts.push(format!("could not collect {}: {}", failed.name, failed.error));
    }
    parts.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::converter::ConvertOutput;
    use crate::test_support::{ScriptedConvert, ScriptedConverter, TestRoot};
    use std::fs;

    #[test]
    fn converts_each_ready_directory_in_order() {
        let root = TestRoot::new().expect("root");
        root.add_book("b").expect("book b");
        root.add_book("a").expect("book a");
        let converter = ScriptedConverter::new(vec![
            ScriptedConvert::writes(&["a.epub"]),
            ScriptedConvert::writes(&["b.epub"]),
        ]);

        let mut seen = Vec::new();
        let summary = run_batch(root.path(), &root.config(), &converter, |o| {
            seen.push(o.name.clone());
        })
        .expect("batch");

        assert_eq!(seen, vec!["a", "b"]);
        assert_eq!(converter.workdirs(), vec![root.dir("a"), root.dir("b")]);
        assert_eq!(summary.counts.converted, 2);
        assert!(root.path().join("a.epub").is_file());
        assert!(root.path().join("b.epub").is_file());
    }

    #[test]
    fn helper_is_staged_during_conversion_and_removed_after() {
        let root = TestRoot::new().expect("root");
        root.add_book("a").expect("book");
        let converter = ScriptedConverter::new(vec![ScriptedConvert::writes(&["a.epub"])]);

        run_batch(root.path(), &root.config(), &converter, |_| {}).expect("batch");

        assert_eq!(converter.helper_seen(), vec![true]);
        assert!(!root.dir("a").join(TestRoot::HELPER).exists());
    }

    #[test]
    fn keep_helper_leaves_staged_copy() {
        let root = TestRoot::new().expect("root");
        root.add_book("a").expect("book");
        let converter = ScriptedConverter::new(vec![ScriptedConvert::writes(&["a.epub"])]);
        let cfg = BatchConfig {
            remove_helper: false,
            ..root.config()
        };

        run_batch(root.path(), &cfg, &converter, |_| {}).expect("batch");
        assert!(root.dir("a").join(TestRoot::HELPER).exists());
    }

    #[test]
    fn failure_does_not_stop_later_directories() {
        let root = TestRoot::new().expect("root");
        root.add_book("a").expect("book");
        root.add_book("b").expect("book");
        let converter = ScriptedConverter::new(vec![
            ScriptedConvert {
                files: vec!["a.epub".to_string()],
                output: ConvertOutput::failed(1),
            },
            ScriptedConvert::writes(&["b.epub"]),
        ]);

        let summary = run_batch(root.path(), &root.config(), &converter, |_| {}).expect("batch");

        assert_eq!(summary.outcomes[0].status, DirStatus::ConverterFailed);
        assert_eq!(summary.outcomes[0].exit_code, Some(1));
        assert!(root.dir("a").join("a.epub").exists(), "failed output stays in place");
        assert_eq!(summary.outcomes[1].status, DirStatus::Converted);
        assert!(!summary.stopped_early);
    }

    #[test]
    fn fail_fast_stops_after_first_failure() {
        let root = TestRoot::new().expect("root");
        root.add_book("a").expect("book");
        root.add_book("b").expect("book");
        let converter = ScriptedConverter::new(vec![ScriptedConvert::writes(&[])]);
        let cfg = BatchConfig {
            fail_fast: true,
            ..root.config()
        };

        let summary = run_batch(root.path(), &cfg, &converter, |_| {}).expect("batch");

        assert_eq!(summary.outcomes.len(), 1);
        assert_eq!(summary.outcomes[0].status, DirStatus::NoOutput);
        assert!(summary.stopped_early);
        assert_eq!(converter.workdirs().len(), 1);
    }

    #[test]
    fn timed_out_directory_is_reported() {
        let root = TestRoot::new().expect("root");
        root.add_book("slow").expect("book");
        let converter = ScriptedConverter::new(vec![ScriptedConvert {
            files: Vec::new(),
            output: ConvertOutput {
                exit_code: None,
                success: false,
                timed_out: true,
            },
        }]);

        let summary = run_batch(root.path(), &root.config(), &converter, |_| {}).expect("batch");
        assert_eq!(summary.outcomes[0].status, DirStatus::TimedOut);
        assert!(
            summary.outcomes[0]
                .message
                .as_deref()
                .is_some_and(|m| m.contains("timed out"))
        );
    }

    #[test]
    fn conflicting_output_is_an_error_without_overwrite() {
        let root = TestRoot::new().expect("root");
        root.add_book("a").expect("book");
        fs::write(root.path().join("a.epub"), "old").expect("write");
        let converter = ScriptedConverter::new(vec![ScriptedConvert::writes(&["a.epub"])]);

        let summary = run_batch(root.path(), &root.config(), &converter, |_| {}).expect("batch");
        let outcome = &summary.outcomes[0];
        assert_eq!(outcome.status, DirStatus::Error);
        assert_eq!(outcome.conflicts, vec!["a.epub"]);
        assert_eq!(
            fs::read_to_string(root.path().join("a.epub")).expect("read"),
            "old"
        );
    }

    #[test]
    fn partially_collected_directory_records_what_was_moved() {
        let root = TestRoot::new().expect("root");
        root.add_book("a").expect("book");
        fs::create_dir(root.path().join("b.epub")).expect("mkdir");
        let converter =
            ScriptedConverter::new(vec![ScriptedConvert::writes(&["a.epub", "b.epub"])]);
        let cfg = BatchConfig {
            overwrite: true,
            ..root.config()
        };

        let summary = run_batch(root.path(), &cfg, &converter, |_| {}).expect("batch");
        let outcome = &summary.outcomes[0];
        assert_eq!(outcome.status, DirStatus::Error);
        assert_eq!(outcome.collected, vec!["a.epub"]);
        assert!(root.path().join("a.epub").is_file());
        assert!(root.dir("a").join("b.epub").is_file());
        assert!(
            outcome
                .message
                .as_deref()
                .is_some_and(|m| m.contains("could not collect b.epub"))
        );
        assert!(!root.dir("a").join(TestRoot::HELPER).exists());
    }

    #[test]
    fn skipped_directories_are_reported_without_running() {
        let root = TestRoot::new().expect("root");
        fs::create_dir(root.dir("empty")).expect("mkdir");
        let converter = ScriptedConverter::new(Vec::new());

        let summary = run_batch(root.path(), &root.config(), &converter, |_| {}).expect("batch");
        assert_eq!(summary.outcomes[0].status, DirStatus::Skipped);
        assert!(converter.workdirs().is_empty());
        assert!(!root.dir("empty").join(TestRoot::HELPER).exists());
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_directory_is_an_error_outcome_not_an_abort() {
        use std::os::unix::fs::PermissionsExt;

        let root = TestRoot::new().expect("root");
        root.add_book("a").expect("book");
        let locked = root.add_book("locked").expect("book");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).expect("chmod");
        if fs::read_dir(&locked).is_ok() {
            // Privileged users read through mode bits.
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("chmod back");
            return;
        }
        let converter = ScriptedConverter::new(vec![ScriptedConvert::writes(&["a.epub"])]);

        let summary = run_batch(root.path(), &root.config(), &converter, |_| {});
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("chmod back");

        let summary = summary.expect("batch");
        assert_eq!(summary.outcomes[0].status, DirStatus::Converted);
        assert_eq!(summary.outcomes[1].name, "locked");
        assert_eq!(summary.outcomes[1].status, DirStatus::Error);
        assert!(
            summary.outcomes[1]
                .message
                .as_deref()
                .is_some_and(|m| m.starts_with("preflight failed"))
        );
        assert_eq!(converter.workdirs(), vec![root.dir("a")]);
    }

    #[test]
    fn missing_helper_aborts_before_any_directory() {
        let root = TestRoot::new().expect("root");
        root.add_book("a").expect("book");
        fs::remove_file(root.path().join(TestRoot::HELPER)).expect("remove helper");
        let converter = ScriptedConverter::new(Vec::new());

        let err = run_batch(root.path(), &root.config(), &converter, |_| {}).unwrap_err();
        assert!(err.to_string().contains("missing helper"));
        assert!(converter.workdirs().is_empty());
    }

    #[test]
    fn converter_error_becomes_error_outcome() {
        let root = TestRoot::new().expect("root");
        root.add_book("a").expect("book");
        root.add_book("b").expect("book");
        // An exhausted script makes the fake return Err for "b".
        let converter = ScriptedConverter::new(vec![ScriptedConvert::writes(&["a.epub"])]);

        let summary = run_batch(root.path(), &root.config(), &converter, |_| {}).expect("batch");
        assert_eq!(summary.outcomes[1].status, DirStatus::Error);
        assert!(!root.dir("b").join(TestRoot::HELPER).exists());
    }

    #[test]
    fn report_is_written_for_the_run() {
        let root = TestRoot::new().expect("root");
        root.add_book("a").expect("book");
        let converter = ScriptedConverter::new(vec![ScriptedConvert::writes(&["a.epub"])]);

        let summary = run_batch(root.path(), &root.config(), &converter, |_| {}).expect("batch");
        let paths = RunPaths::new(root.path(), &summary.run_id);
        let loaded = crate::io::report::load_report(&paths.report_path).expect("report");
        assert_eq!(loaded, summary);
    }
}
