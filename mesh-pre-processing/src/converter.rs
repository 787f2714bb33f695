/// Mesh to height map pipeline: load, bound, sample, rasterise, save.
use crate::bounds::{MeshBounds, compute_bounds, compute_bounds_with_progress};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::heightmap::HeightmapGenerator;
use crate::loader::load_mesh;
use crate::mesh::Mesh;
use crate::orchestrator::SamplingOrchestrator;
use crate::resolution::Resolution;
use crate::sampling::Backend;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Outcome of one conversion, also written as the metadata file.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    pub input: PathBuf,
    pub bounds: MeshBounds,
    pub resolution: Resolution,
    pub num_samples: usize,
    pub backend: Backend,
    pub seed: u64,
    pub output_files: Vec<PathBuf>,
    pub metadata_path: PathBuf,
}

pub struct MeshConverter {
    config: PipelineConfig,
    orchestrator: SamplingOrchestrator,
}

impl MeshConverter {
    /// Validates the configuration. A GPU is probed only when requested.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let orchestrator = if config.use_gpu {
            SamplingOrchestrator::detect()
        } else {
            SamplingOrchestrator::cpu_only()
        };
        Ok(Self {
            config,
            orchestrator,
        })
    }

    /// Converter with a caller-provided orchestrator, for sharing one device.
    pub fn with_orchestrator(config: PipelineConfig, orchestrator: SamplingOrchestrator) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            orchestrator,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the whole pipeline for one OBJ file.
    pub fn convert(&self, input: &Path) -> Result<ConversionReport> {
        let mesh = load_mesh(input)?;
        self.convert_mesh(input, &mesh)
    }

    /// Run the pipeline on an already loaded mesh. `input` names the source
    /// in the metadata only.
    pub fn convert_mesh(&self, input: &Path, mesh: &Mesh) -> Result<ConversionReport> {
        let config = &self.config;
        log::info!(
            "Converting {} to a height map ({} mode)",
            input.display(),
            if config.large_model { "large model" } else { "in-memory" }
        );

        let bounds = if config.large_model {
            compute_bounds_with_progress(mesh, config.chunk_size, config.show_progress)?
        } else {
            compute_bounds(mesh, mesh.vertex_count().max(1))?
        };
        self.print_bounds(&bounds);

        let resolution = Resolution::from_bounds(&bounds, config.max_resolution, config.up_axis)?;

        // Fixed up front so the metadata can replay the run.
        let seed = config.seed.unwrap_or_else(rand::random);
        let mut options = config.sampling_options();
        options.seed = Some(seed);
        let samples = self.orchestrator.sample(mesh, &options)?;

        let heightmap = HeightmapGenerator::new(resolution, config.up_axis).generate(&samples.points, &bounds);

        if let Some(parent) = config.output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let output_files = heightmap.save(&config.output_path, config.bit_depth()?, config.split)?;

        let report = ConversionReport {
            input: input.to_path_buf(),
            bounds,
            resolution,
            num_samples: samples.len(),
            backend: samples.backend,
            seed,
            output_files,
            metadata_path: metadata_path(&config.output_path),
        };
        self.save_metadata(&report)?;

        log::info!("Conversion complete!");
        Ok(report)
    }

    fn print_bounds(&self, bounds: &MeshBounds) {
        let size = bounds.dimensions();
        log::info!(
            "Mesh bounds: X [{:.3}, {:.3}] Y [{:.3}, {:.3}] Z [{:.3}, {:.3}] (size {:.3} x {:.3} x {:.3})",
            bounds.min.x,
            bounds.max.x,
            bounds.min.y,
            bounds.max.y,
            bounds.min.z,
            bounds.max.z,
            size.x,
            size.y,
            size.z
        );
    }

    fn save_metadata(&self, report: &ConversionReport) -> Result<()> {
        let metadata = serde_json::json!({
            "input": report.input,
            "bounds": {
                "min_x": report.bounds.min.x, "max_x": report.bounds.max.x,
                "min_y": report.bounds.min.y, "max_y": report.bounds.max.y,
                "min_z": report.bounds.min.z, "max_z": report.bounds.max.z
            },
            "resolution": report.resolution,
            "up_axis": self.config.up_axis,
            "num_samples": report.num_samples,
            "backend": report.backend,
            "seed": report.seed,
            "bit_depth": self.config.bit_depth,
            "split": self.config.split,
            "output_files": report.output_files,
        });

        fs::write(&report.metadata_path, serde_json::to_string_pretty(&metadata)?)?;
        log::info!("Saved {}", report.metadata_path.display());
        Ok(())
    }
}

/// `dir/<stem>_metadata.json` next to the height map.
fn metadata_path(output_path: &Path) -> PathBuf {
    let stem = output_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "height_map".to_string());
    output_path.with_file_name(format!("{stem}_metadata.json"))
}
