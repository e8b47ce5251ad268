//! llama.cpp runtime linked into the process (`llama-cpp` feature).

use super::{GenerationParams, ModelRuntime, RuntimeChoice, RuntimeCompletion, RuntimeError};
use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel, Special};
use llama_cpp_2::sampling::LlamaSampler;
use std::num::NonZeroU32;
use std::path::Path;

/// Context window for embedded generations.
pub const CONTEXT_SIZE: u32 = 8192;

/// Seed value that asks llama.cpp for a random seed.
const RANDOM_SEED: u32 = u32::MAX;

pub struct LlamaCppRuntime {
    // Field order matters: the model must be freed before the backend.
    model: LlamaModel,
    backend: LlamaBackend,
    n_ctx: u32,
}

impl LlamaCppRuntime {
    /// Load a GGUF model. `n_gpu_layers = None` offloads every layer.
    pub fn load(model_path: &Path, n_gpu_layers: Option<u32>) -> Result<Self, RuntimeError> {
        let backend = LlamaBackend::init().map_err(RuntimeError::new)?;
        let model_params =
            LlamaModelParams::default().with_n_gpu_layers(n_gpu_layers.unwrap_or(u32::MAX));
        let model = LlamaModel::load_from_file(&backend, model_path, &model_params)
            .map_err(RuntimeError::new)?;

        tracing::info!(
            model = %model_path.display(),
            n_gpu_layers = ?n_gpu_layers,
            "Loaded llama.cpp model"
        );

        Ok(Self {
            model,
            backend,
            n_ctx: CONTEXT_SIZE,
        })
    }
}

impl ModelRuntime for LlamaCppRuntime {
    fn create_completion(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<RuntimeCompletion, RuntimeError> {
        let ctx_params = LlamaContextParams::default().with_n_ctx(NonZeroU32::new(self.n_ctx));
        let mut ctx = self
            .model
            .new_context(&self.backend, ctx_params)
            .map_err(RuntimeError::new)?;

        let tokens = self
            .model
            .str_to_token(prompt, AddBos::Always)
            .map_err(RuntimeError::new)?;
        let n_ctx = ctx.n_ctx() as usize;
        if tokens.len() >= n_ctx {
            return Err(RuntimeError::new(format!(
                "Requested tokens ({}) exceed context window of {}",
                tokens.len(),
                n_ctx
            )));
        }

        let mut batch = LlamaBatch::new(n_ctx, 1);
        let last_index = tokens.len() as i32 - 1;
        for (i, token) in (0_i32..).zip(tokens.iter().copied()) {
            batch
                .add(token, i, &[0], i == last_index)
                .map_err(RuntimeError::new)?;
        }
        ctx.decode(&mut batch).map_err(RuntimeError::new)?;

        let mut sampler = LlamaSampler::chain_simple([
            LlamaSampler::top_p(params.top_p, 1),
            LlamaSampler::temp(params.temperature),
            LlamaSampler::dist(RANDOM_SEED),
        ]);

        // Negative max_tokens generates until end of generation or a full context.
        let budget = usize::try_from(params.max_tokens).unwrap_or(n_ctx);
        let limit = tokens.len().saturating_add(budget).min(n_ctx) as i32;
        let mut n_cur = batch.n_tokens();
        let mut bytes = Vec::new();

        while n_cur < limit {
            let token = sampler.sample(&ctx, batch.n_tokens() - 1);
            sampler.accept(token);

            if self.model.is_eog_token(token) {
                break;
            }

            bytes.extend(
                self.model
                    .token_to_bytes(token, Special::Tokenize)
                    .map_err(RuntimeError::new)?,
            );

            batch.clear();
            batch.add(token, n_cur, &[0], true).map_err(RuntimeError::new)?;
            ctx.decode(&mut batch).map_err(RuntimeError::new)?;
            n_cur += 1;
        }

        Ok(RuntimeCompletion {
            choices: vec![RuntimeChoice {
                text: String::from_utf8_lossy(&bytes).into_owned(),
            }],
        })
    }
}
