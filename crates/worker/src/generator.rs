//! Latent generation.
//!
//! The worker does not embed a diffusion model. [`ScriptGenerator`] runs
//! an external sampler per job: the job is piped to its stdin as JSON and
//! the sampler writes a latent container to the path in `UNFUZZED_OUTPUT`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use unfuzzed_core::latent::{LatentContainer, Tensor, LATENT_TENSOR_KEY};
use unfuzzed_core::protocol::JobBody;

use crate::config::GeneratorConfig;
use crate::error::ProcessError;

/// Environment variable telling the sampler where to write its output.
pub const OUTPUT_ENV_VAR: &str = "UNFUZZED_OUTPUT";

/// Cap on captured sampler stderr (64 KiB).
const MAX_STDERR_BYTES: u64 = 64 * 1024;

/// Produces the raw (unscaled) latent for a job.
#[async_trait]
pub trait LatentGenerator: Send + Sync {
    async fn generate(&self, job: &JobBody) -> Result<Tensor, ProcessError>;
}

/// Payload written to the sampler's stdin.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SamplerInput<'a> {
    image_id: &'a str,
    positive_prompt: &'a str,
    negative_prompt: &'a str,
    num_inference_steps: u32,
    guidance_scale: f32,
}

/// Runs an external sampler command once per job.
pub struct ScriptGenerator {
    config: GeneratorConfig,
    work_dir: PathBuf,
}

impl ScriptGenerator {
    pub fn new(config: GeneratorConfig, work_dir: PathBuf) -> Self {
        Self { config, work_dir }
    }

    fn output_path(&self, image_id: &str) -> PathBuf {
        self.work_dir.join(format!("{image_id}.raw.latent"))
    }

    async fn run_sampler(&self, job: &JobBody, output: &Path) -> Result<(), ProcessError> {
        let input = SamplerInput {
            image_id: &job.image_id,
            positive_prompt: &job.positive_prompt,
            negative_prompt: &job.negative_prompt,
            num_inference_steps: self.config.steps,
            guidance_scale: self.config.guidance_scale,
        };
        let payload = serde_json::to_vec(&input)
            .map_err(|e| ProcessError::Generation(format!("Cannot encode sampler input: {e}")))?;

        // `kill_on_drop(true)` kills the sampler when the timeout drops the child.
        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .env(OUTPUT_ENV_VAR, output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ProcessError::Generation(format!("Cannot start {}: {e}", self.config.program))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // The sampler may exit without reading its input.
            let _ = stdin.write_all(&payload).await;
            drop(stdin);
        }

        let stderr_task = tokio::spawn(read_capped(child.stderr.take()));

        let start = Instant::now();
        let status = match tokio::time::timeout(self.config.timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_elapsed) => {
                return Err(ProcessError::Generation(format!(
                    "Sampler timed out after {}",
                    format_duration(start.elapsed())
                )));
            }
        };

        if !status.success() {
            let stderr = stderr_task.await.unwrap_or_default();
            return Err(ProcessError::Generation(format!(
                "Sampler exited with code {}: {}",
                status.code().unwrap_or(-1),
                String::from_utf8_lossy(&stderr).trim()
            )));
        }

        tracing::debug!(
            image_id = %job.image_id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Sampler finished",
        );
        Ok(())
    }
}

#[async_trait]
impl LatentGenerator for ScriptGenerator {
    async fn generate(&self, job: &JobBody) -> Result<Tensor, ProcessError> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let output = self.output_path(&job.image_id);

        let result = self.run_sampler(job, &output).await;
        let bytes = match result {
            Ok(()) => tokio::fs::read(&output).await.map_err(|e| {
                ProcessError::Generation(format!("Sampler wrote no output: {e}"))
            }),
            Err(e) => Err(e),
        };
        let _ = tokio::fs::remove_file(&output).await;

        let mut container = LatentContainer::from_bytes(&bytes?)?;
        Ok(container.take(LATENT_TENSOR_KEY)?)
    }
}

async fn read_capped<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(h) = handle {
        let _ = h.take(MAX_STDERR_BYTES).read_to_end(&mut buf).await;
    }
    buf
}

fn format_duration(elapsed: Duration) -> String {
    format!("{:.1}s", elapsed.as_secs_f64())
}

#[cfg(all(test, unix))]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn job() -> JobBody {
        JobBody {
            web_socket_id: None,
            image_id: "IMG1".into(),
            positive_prompt: "a cat".into(),
            negative_prompt: String::new(),
        }
    }

    fn shell(script: &str, timeout: Duration) -> GeneratorConfig {
        GeneratorConfig {
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
            timeout,
            steps: 12,
            guidance_scale: 5.0,
        }
    }

    #[tokio::test]
    async fn reads_latent_written_by_sampler() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = dir.path().join("fixture.latent");
        let tensor = Tensor::new(vec![1, 4, 1, 2], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0])
            .unwrap();
        std::fs::write(&fixture, LatentContainer::for_latent(tensor.clone()).to_bytes()).unwrap();

        let script = format!("cat > /dev/null; cp '{}' \"$UNFUZZED_OUTPUT\"", fixture.display());
        let generator = ScriptGenerator::new(
            shell(&script, Duration::from_secs(10)),
            dir.path().join("work"),
        );

        let latent = generator.generate(&job()).await.unwrap();
        assert_eq!(latent, tensor);
        assert!(!generator.output_path("IMG1").exists());
    }

    #[tokio::test]
    async fn sampler_receives_job_on_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let captured = dir.path().join("stdin.json");
        let script = format!("cat > '{}'; exit 1", captured.display());
        let generator =
            ScriptGenerator::new(shell(&script, Duration::from_secs(10)), dir.path().into());

        let _ = generator.generate(&job()).await;

        let input: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&captured).unwrap()).unwrap();
        assert_eq!(input["positivePrompt"], "a cat");
        assert_eq!(input["imageId"], "IMG1");
        assert_eq!(input["numInferenceSteps"], 12);
    }

    #[tokio::test]
    async fn nonzero_exit_reports_code_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ScriptGenerator::new(
            shell("echo 'out of memory' >&2; exit 3", Duration::from_secs(10)),
            dir.path().into(),
        );

        let err = generator.generate(&job()).await.unwrap_err();
        assert_matches!(
            err,
            ProcessError::Generation(msg) if msg.contains("code 3") && msg.contains("out of memory")
        );
    }

    #[tokio::test]
    async fn slow_sampler_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ScriptGenerator::new(
            shell("sleep 5", Duration::from_millis(100)),
            dir.path().into(),
        );

        let err = generator.generate(&job()).await.unwrap_err();
        assert_matches!(err, ProcessError::Generation(msg) if msg.contains("timed out"));
    }

    #[tokio::test]
    async fn missing_output_is_a_generation_error() {
        let dir = tempfile::tempdir().unwrap();
        let generator =
            ScriptGenerator::new(shell("exit 0", Duration::from_secs(10)), dir.path().into());

        assert_matches!(
            generator.generate(&job()).await,
            Err(ProcessError::Generation(_))
        );
    }
}
