//! Integration tests for compress-advisor

use std::fs;

use anyhow::Result;
use compress_advisor::*;
use rand::{Rng, SeedableRng};

fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; len];
    rng.fill(&mut data[..]);
    data
}

#[test]
fn test_predict_then_compress_lifecycle() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("corpus.txt");
    let output = dir.path().join("corpus.txt.xz");
    fs::write(&input, "the quick brown fox jumps over the lazy dog\n".repeat(500))?;

    let mut advisor = Advisor::default();
    let prediction = advisor
        .predict_file(&input, Strategy::Balanced)?
        .expect("non-empty file");
    assert_eq!(prediction.category, ContentCategory::Text);

    let report = advisor.compress_file(&input, &output, Strategy::Balanced)?;
    assert_eq!(report.recommendation.category, ContentCategory::Text);
    assert!(report.result.compression_ratio < 0.1);
    assert_eq!(advisor.verify_file(&output), IntegrityStatus::Ok);

    let (decoded, status) = XzCodec.decode(&fs::read(&output)?, false)?;
    assert_eq!(status, StreamStatus::EndOfStream);
    assert_eq!(decoded, fs::read(&input)?);
    Ok(())
}

#[test]
fn test_random_data_is_predicted_incompressible() {
    let data = random_bytes(64 * 1024, 7);
    let prediction = Advisor::default().predict(&data, Strategy::Auto).unwrap();
    assert_eq!(prediction.category, ContentCategory::Binary);
    assert!(prediction.entropy_bits > 7.9);
    // base ratio bottoms out at 0.1 for near-maximal entropy
    assert!((prediction.predicted_ratio - 0.1).abs() < 1e-9);
}

#[test]
fn test_optimizer_prefers_high_presets_for_ratio() {
    let mut advisor = Advisor::new(Box::new(DeflateCodec), AdvisorConfig::default());
    let sample = b"optimizer sample line with some repetition\n".repeat(200);
    let result = advisor
        .optimize(&sample, Strategy::Ratio, OptimizationLimits::default())
        .unwrap();
    assert!((7..=9).contains(&result.optimal_preset));
    assert_eq!(result.trials.len(), 3);
    assert!(result.estimated_ratio < 1.0);
    assert_eq!(advisor.optimizer().stats().tests_run, 3);
}

#[test]
fn test_memory_limit_bounds_search() {
    let mut advisor = Advisor::default();
    let sample = b"memory bounded".repeat(100);
    let limits = OptimizationLimits {
        memory_limit_mb: Some(100),
        time_limit_seconds: None,
    };
    let result = advisor.optimize(&sample, Strategy::Auto, limits).unwrap();
    assert!(result.optimal_preset <= 6);
    assert!(result.trials.iter().all(|t| t.preset <= 6));
}

#[test]
fn test_benchmark_and_grades() {
    let mut advisor = Advisor::default();
    let data = b"benchmark data ".repeat(1000);
    let runs = advisor.benchmark(&data, &[1, 6, 9], Strategy::Speed);
    assert_eq!(runs.len(), 3);
    for run in &runs {
        assert!(run.result.compression_ratio < 0.1);
        assert!(run.quality.ratio_score > 90.0);
        assert_eq!(run.quality.grade, Grade::from_score(run.quality.overall_score));
    }
    assert_eq!(advisor.stats().measurements, 3);
}

#[test]
fn test_recovery_salvages_truncated_stream() -> Result<()> {
    let original = b"salvage as much as possible ".repeat(2000);
    let stream = XzCodec.encode(&original, 6, &FilterChain::default(), IntegrityCheck::Crc64)?;
    let truncated = &stream[..stream.len() * 3 / 4];

    let mut engine = RecoveryEngine::default();
    let attempt = engine.attempt(&XzCodec, truncated, RecoveryMode::Partial);
    assert!(attempt.is_success());
    assert!(!attempt.data.is_empty());
    assert!(original.starts_with(&attempt.data));
    assert_eq!(engine.stats().corrupted_blocks, 1);
    assert_eq!(engine.stats().recovered_blocks, 1);
    Ok(())
}

#[test]
fn test_verify_detects_damage() -> Result<()> {
    let advisor = Advisor::default();
    let stream = XzCodec.encode(&random_bytes(20_000, 3), 3, &FilterChain::default(), IntegrityCheck::Crc64)?;
    assert_eq!(advisor.verify(&stream), IntegrityStatus::Ok);
    assert_eq!(advisor.verify(&stream[..stream.len() / 2]), IntegrityStatus::Corrupted);
    assert_eq!(advisor.verify(&[]), IntegrityStatus::Unknown);
    Ok(())
}

#[test]
fn test_repair_recovers_streams_around_garbage() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let damaged = dir.path().join("damaged.xz");
    let repaired = dir.path().join("repaired");

    let mut bytes = XzCodec.encode(b"one,", 6, &FilterChain::default(), IntegrityCheck::Crc32)?;
    bytes.extend(random_bytes(100, 9));
    bytes.extend(XzCodec.encode(b"two", 6, &FilterChain::default(), IntegrityCheck::Crc32)?);
    fs::write(&damaged, &bytes)?;

    let report = Advisor::default().repair_file(&damaged, &repaired)?;
    assert!(report.complete);
    assert_eq!(fs::read(&repaired)?, b"one,two");
    Ok(())
}

#[test]
fn test_config_from_json_drives_advisor() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("advisor.json");
    fs::write(
        &path,
        r#"{ "analytics_enabled": false, "recovery_mode": "Maximum", "parallel": { "block_size": 1048576 } }"#,
    )?;
    let config = AdvisorConfig::from_json_file(&path)?;
    let advisor = Advisor::new(Box::new(XzCodec), config);
    assert!(!advisor.analytics().is_enabled());
    assert_eq!(advisor.recovery().mode(), RecoveryMode::Maximum);
    assert_eq!(advisor.planner().config().block_size, 1024 * 1024);
    assert_eq!(advisor.config().sample_limit, 1024 * 1024);
    Ok(())
}

#[test]
fn test_parallel_plan_for_large_file() {
    let planner = ParallelPlanner::with_hardware_threads(ParallelConfig::default(), 8);
    let plan = planner.plan(1 << 30, 1 << 30);
    assert_eq!(plan.threads, 8);
    assert_eq!(plan.block_size, (1 << 30) / 32);

    let pinned = ParallelConfig {
        threads: 2,
        ..ParallelConfig::default()
    };
    let plan = ParallelPlanner::with_hardware_threads(pinned, 8).plan(1 << 30, 1 << 30);
    assert_eq!(plan.threads, 2);
    assert_eq!(plan.timeout_ms, 300);
}

#[test]
fn test_empty_input_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("empty");
    fs::write(&input, b"")?;
    let result = Advisor::default().compress_file(&input, dir.path().join("out"), Strategy::Auto);
    assert!(matches!(result, Err(AdvisorError::EmptyInput)));
    Ok(())
}
