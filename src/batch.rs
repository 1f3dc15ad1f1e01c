//! Data-parallel analysis of many activities using rayon
//!
//! Every job is independent, so jobs run on a rayon pool with no shared
//! state besides the progress bar. A failing job is recorded in the summary
//! and does not stop the others. Outcomes keep the order of the input jobs.

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{info, warn};

use crate::analysis::ComplianceAnalyzer;
use crate::error::{ComplianceError, Result};
use crate::models::{ActivityStreams, Channel, PlannedWorkout, ThresholdProfile};
use crate::report::{ComplianceReport, Grade};

/// Configuration for batch analysis
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Worker threads (None for the rayon default of one per CPU)
    pub num_threads: Option<usize>,
    /// Show a progress bar on stderr
    pub show_progress: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            num_threads: None,
            show_progress: false,
        }
    }
}

/// One activity to check against one plan
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    /// Caller's identifier, e.g. the activity file name
    pub id: String,
    pub profile: ThresholdProfile,
    pub workout: PlannedWorkout,
    pub streams: ActivityStreams,
    pub channel: Channel,
}

/// Result of a single job
#[derive(Debug)]
pub struct JobOutcome {
    pub id: String,
    pub result: Result<ComplianceReport>,
    pub duration_ms: u128,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Summary of a batch run
#[derive(Debug)]
pub struct BatchSummary {
    pub total_jobs: usize,
    pub successful_jobs: usize,
    pub failed_jobs: usize,
    pub total_duration_ms: u128,
    /// Per-job outcomes in input order
    pub outcomes: Vec<JobOutcome>,
}

impl BatchSummary {
    /// Jobs per second
    pub fn throughput_jobs_per_sec(&self) -> f64 {
        if self.total_duration_ms == 0 {
            return 0.0;
        }
        (self.total_jobs as f64 / self.total_duration_ms as f64) * 1000.0
    }

    /// Mean overall score of the successful jobs
    pub fn average_score(&self) -> Option<f64> {
        let scores: Vec<f64> = self.reports().map(|r| r.overall_score_f64()).collect();
        if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        }
    }

    pub fn grade_distribution(&self) -> BTreeMap<Grade, usize> {
        let mut distribution = BTreeMap::new();
        for report in self.reports() {
            *distribution.entry(report.grade).or_insert(0) += 1;
        }
        distribution
    }

    pub fn reports(&self) -> impl Iterator<Item = &ComplianceReport> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn errors(&self) -> impl Iterator<Item = (&str, &ComplianceError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.id.as_str(), e)))
    }

    pub fn is_fully_successful(&self) -> bool {
        self.failed_jobs == 0
    }

    pub fn to_string_pretty(&self) -> String {
        format!(
            "Batch Analysis Summary\n  \
             Total Activities: {}\n  \
             Analyzed: {}\n  \
             Failed: {}\n  \
             Average Score: {}\n  \
             Total Time: {:.2}s\n  \
             Throughput: {:.2} activities/sec",
            self.total_jobs,
            self.successful_jobs,
            self.failed_jobs,
            self.average_score()
                .map(|s| format!("{:.1}", s))
                .unwrap_or_else(|| "n/a".to_string()),
            self.total_duration_ms as f64 / 1000.0,
            self.throughput_jobs_per_sec()
        )
    }
}

/// Runs a [`ComplianceAnalyzer`] over many jobs in parallel
pub struct BatchAnalyzer {
    pub config: BatchConfig,
    analyzer: ComplianceAnalyzer,
}

impl BatchAnalyzer {
    pub fn new(analyzer: ComplianceAnalyzer, config: BatchConfig) -> Self {
        Self { config, analyzer }
    }

    pub fn run(&self, jobs: &[AnalysisJob]) -> Result<BatchSummary> {
        let start_time = Instant::now();
        info!("Starting batch analysis of {} activities", jobs.len());

        let progress = self.config.show_progress.then(|| {
            let pb = ProgressBar::new(jobs.len() as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({msg})")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb
        });

        let outcomes = match self.config.num_threads {
            Some(num_threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .build()
                    .map_err(|e| {
                        ComplianceError::Configuration(format!("Failed to create thread pool: {}", e))
                    })?;
                pool.install(|| self.run_parallel(jobs, progress.as_ref()))
            }
            None => self.run_parallel(jobs, progress.as_ref()),
        };

        if let Some(pb) = progress {
            pb.finish_with_message("Complete");
        }

        let successful_jobs = outcomes.iter().filter(|o| o.is_success()).count();
        let summary = BatchSummary {
            total_jobs: jobs.len(),
            successful_jobs,
            failed_jobs: jobs.len() - successful_jobs,
            total_duration_ms: start_time.elapsed().as_millis(),
            outcomes,
        };

        info!("{}", summary.to_string_pretty());
        Ok(summary)
    }

    fn run_parallel(&self, jobs: &[AnalysisJob], progress: Option<&ProgressBar>) -> Vec<JobOutcome> {
        jobs.par_iter()
            .map(|job| {
                let started = Instant::now();
                let result = self
                    .analyzer
                    .analyze(&job.profile, &job.workout, &job.streams, job.channel);

                if let Err(e) = &result {
                    warn!(job = %job.id, error = %e, "analysis failed");
                }
                if let Some(pb) = progress {
                    pb.set_message(job.id.clone());
                    pb.inc(1);
                }

                JobOutcome {
                    id: job.id.clone(),
                    result,
                    duration_ms: started.elapsed().as_millis(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PlannedSegment, SegmentType};

    fn job(id: &str, steps: &[(u32, f64)]) -> AnalysisJob {
        AnalysisJob {
            id: id.to_string(),
            profile: ThresholdProfile::new(250.0),
            workout: PlannedWorkout::from_segments(vec![
                PlannedSegment::new(SegmentType::Warmup, 56.0, 70.0, 300.0),
                PlannedSegment::new(SegmentType::Interval, 92.0, 104.0, 300.0),
            ]),
            streams: ActivityStreams::from_power_steps(steps),
            channel: Channel::Power,
        }
    }

    #[test]
    fn test_batch_preserves_order_and_collects_failures() {
        let jobs = vec![
            job("good", &[(300, 150.0), (300, 240.0)]),
            job("empty", &[]),
            job("easy", &[(600, 100.0)]),
        ];

        let analyzer = BatchAnalyzer::new(
            ComplianceAnalyzer::default(),
            BatchConfig {
                num_threads: Some(2),
                show_progress: false,
            },
        );
        let summary = analyzer.run(&jobs).unwrap();

        let ids: Vec<&str> = summary.outcomes.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["good", "empty", "easy"]);
        assert_eq!(summary.total_jobs, 3);
        assert_eq!(summary.successful_jobs, 2);
        assert_eq!(summary.failed_jobs, 1);
        assert!(!summary.is_fully_successful());
        assert_eq!(summary.errors().map(|(id, _)| id).collect::<Vec<_>>(), vec!["empty"]);

        let first = summary.outcomes[0].result.as_ref().unwrap();
        assert_eq!(first.grade, Grade::A);
        assert!(summary.average_score().is_some());
    }

    #[test]
    fn test_batch_matches_sequential_analysis() {
        let jobs: Vec<AnalysisJob> = (0..8)
            .map(|i| job(&format!("ride-{}", i), &[(300, 140.0 + i as f64), (300, 235.0 + i as f64)]))
            .collect();

        let analyzer = ComplianceAnalyzer::default();
        let summary = BatchAnalyzer::new(analyzer.clone(), BatchConfig::default())
            .run(&jobs)
            .unwrap();

        for (job, outcome) in jobs.iter().zip(&summary.outcomes) {
            let expected = analyzer
                .analyze(&job.profile, &job.workout, &job.streams, job.channel)
                .unwrap();
            assert_eq!(outcome.result.as_ref().unwrap(), &expected);
        }
        assert_eq!(summary.grade_distribution().values().sum::<usize>(), 8);
    }
}
