//! Pipeline orchestration for one OpenAlex entity

use std::fs;

use anyhow::Context;
use flatline_core::{
    cleanup_tmp_files, CancelToken, Pipeline, PipelineConfig, ProgressContext, RunSummary,
};

use crate::config::Config;
use crate::transform;

/// Core pipeline config for `config`'s entity
pub fn pipeline_config(config: &Config) -> PipelineConfig {
    let mut pc = PipelineConfig::new(
        config.input_dir(),
        config.entity.stream_specs(&config.output_dir),
    )
    .with_workers(config.workers);
    pc.pattern = config.pattern.clone();
    pc.batch_size = config.batch_size;
    pc.capacity = config.capacity;
    pc.format = config.format;
    pc.id_field = transform::ID_FIELD.to_string();
    pc
}

/// Flatten one entity's snapshot files into csv.gz streams
pub fn run(
    config: &Config,
    cancel: CancelToken,
    progress: &ProgressContext,
) -> anyhow::Result<RunSummary> {
    let input_dir = config.input_dir();
    log::info!(
        "Flattening {} from {} into {}",
        config.entity,
        input_dir.display(),
        config.output_dir.display()
    );

    fs::create_dir_all(&config.output_dir).with_context(|| {
        format!("Failed to create output dir {}", config.output_dir.display())
    })?;
    let pipeline_config = pipeline_config(config);
    let stale = cleanup_tmp_files(&pipeline_config.streams).with_context(|| {
        format!("Failed to clean {}", config.output_dir.display())
    })?;
    if stale > 0 {
        log::warn!("Removed {stale} .tmp files left by an earlier run");
    }

    let status = progress.stage_line(config.entity.output_prefix());
    status.set_message(format!(
        "{} streams, {} workers",
        pipeline_config.streams.len(),
        pipeline_config.transform_workers
    ));
    let pb = progress.reader_bar(config.entity.output_prefix());
    let result = Pipeline::new(pipeline_config, config.entity.projections())
        .with_cancel(cancel)
        .with_progress(pb.clone())
        .run();
    pb.finish_and_clear();
    status.finish_and_clear();

    let summary = result.with_context(|| format!("{} pipeline failed", config.entity))?;
    summary.log();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::entity::Entity;

    #[test]
    fn pipeline_config_carries_settings() {
        let config = Config {
            entity: Entity::Funders,
            input_dir: Some(PathBuf::from("/in")),
            output_dir: PathBuf::from("/out"),
            workers: 3,
            batch_size: 10,
            capacity: 4,
            ..Default::default()
        };
        let pc = pipeline_config(&config);
        assert_eq!(pc.input_dir, PathBuf::from("/in"));
        assert_eq!(pc.ingest_channels, 3);
        assert_eq!(pc.transform_workers, 3);
        assert_eq!(pc.batch_size, 10);
        assert_eq!(pc.capacity, 4);
        assert_eq!(pc.id_field, transform::ID_FIELD);
        let paths: Vec<_> = pc.streams.iter().map(|s| s.path.clone()).collect();
        assert_eq!(
            paths,
            [
                PathBuf::from("/out/funders.csv.gz"),
                PathBuf::from("/out/funders_ids.csv.gz")
            ]
        );
        pc.validate().unwrap();
    }
}
