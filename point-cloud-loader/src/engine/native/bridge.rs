use std::sync::Arc;

use constants::colour::U16_CHANNEL_MAX;
use constants::loading::POSITION_STRIDE;
use tracing::debug;

use super::lifecycle::NativeModuleLifecycle;
use super::module::{DecodeArgs, NULL};
use super::region::ForeignHeapRegion;
use crate::config::format_memory;
use crate::engine::loading::request::DecodeOptions;
use crate::engine::memory::MemoryBudgetGuard;
use crate::error::{PipelineError, Result};
use crate::runtime;

/// Host-owned output of one native decode.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeResult {
    /// Interleaved XYZ, `point_count * 3` values.
    pub positions: Vec<f32>,
    /// Min x, y, z then max x, y, z as reported by the file header.
    pub bounds: [f32; 6],
    pub point_count: u32,
    /// Interleaved RGB in 0..1, present when colour was requested and found.
    pub colors: Option<Vec<f32>>,
    pub scale: [f32; 3],
    pub offset: [f32; 3],
    /// Wall-clock time spent inside the native decode call.
    pub decode_time_ms: f64,
}

/// Drives the native decode entry point across the foreign heap boundary.
///
/// Every region is wrapped in a [`ForeignHeapRegion`], so all of them are
/// released exactly once whichever way a decode exits.
#[derive(Debug, Clone)]
pub struct NativeDecodeBridge {
    lifecycle: Arc<NativeModuleLifecycle>,
    budget: MemoryBudgetGuard,
}

impl NativeDecodeBridge {
    pub fn new(lifecycle: Arc<NativeModuleLifecycle>, budget: MemoryBudgetGuard) -> Self {
        Self { lifecycle, budget }
    }

    pub fn lifecycle(&self) -> &Arc<NativeModuleLifecycle> {
        &self.lifecycle
    }

    /// Decode `bytes` with the ready native module.
    ///
    /// Fails with [`PipelineError::NotInitialized`] until the lifecycle has
    /// produced a module.
    pub fn decode(&self, bytes: &[u8], options: &DecodeOptions) -> Result<DecodeResult> {
        let handle = self.lifecycle.handle().ok_or(PipelineError::NotInitialized)?;
        if bytes.is_empty() {
            return Err(PipelineError::EmptySource);
        }
        let module = handle.module().as_ref();

        let _input_budget = self.budget.reserve(bytes.len() as u64)?;
        debug!(
            "Decoding {} (ledger {})",
            format_memory(bytes.len() as u64),
            self.budget.usage()
        );

        let input = ForeignHeapRegion::allocate_with(module, bytes)?;
        let out_size = ForeignHeapRegion::allocate(module, 4)?;
        let bounds = ForeignHeapRegion::allocate(module, 6 * 4)?;
        let colour_ptr = options
            .enable_color
            .then(|| ForeignHeapRegion::allocate(module, 4))
            .transpose()?;
        let colour_size = options
            .enable_color
            .then(|| ForeignHeapRegion::allocate(module, 4))
            .transpose()?;
        let scales = ForeignHeapRegion::allocate(module, 3 * 4)?;
        let offsets = ForeignHeapRegion::allocate(module, 3 * 4)?;
        let point_count = ForeignHeapRegion::allocate(module, 4)?;

        let args = DecodeArgs {
            input: input.address(),
            input_len: u32::try_from(bytes.len()).map_err(|_| {
                PipelineError::Decode(format!("{} byte input exceeds u32 range", bytes.len()))
            })?,
            out_size: out_size.address(),
            bounds: bounds.address(),
            colour_ptr: colour_ptr.as_ref().map_or(NULL, |r| r.address()),
            colour_size: colour_size.as_ref().map_or(NULL, |r| r.address()),
            scales: scales.address(),
            offsets: offsets.address(),
            point_count: point_count.address(),
        };

        let started = runtime::now_ms();
        let data_address = module.decode(&args);
        let decode_time_ms = runtime::now_ms() - started;

        let Some(mut data) = ForeignHeapRegion::adopt(module, data_address, 0) else {
            return Err(PipelineError::Decode(
                "decoder returned no data; input may be malformed".into(),
            ));
        };

        let count = point_count.read_u32()?;
        let reported = out_size.read_u32()? as usize;
        let expected = count as usize * POSITION_STRIDE * 4;
        if reported < expected {
            return Err(PipelineError::Decode(format!(
                "decoder reported {} bytes for {} points",
                reported, count
            )));
        }
        data.set_length(reported);
        let _output_budget = self.budget.reserve(reported as u64)?;

        let header_bounds = array::<6>(&bounds)?;
        let scale = array::<3>(&scales)?;
        let offset = array::<3>(&offsets)?;
        let positions = data.read_f32s(count as usize * POSITION_STRIDE)?;

        let colors = match (&colour_ptr, &colour_size) {
            (Some(ptr), Some(size)) => {
                let address = ptr.read_u32()?;
                let length = size.read_u32()? as usize;
                match ForeignHeapRegion::adopt(module, address, length) {
                    Some(region) if length > 0 => {
                        let channels = region.read_u16s(length / 2)?;
                        drop(region);
                        Some(
                            channels
                                .iter()
                                .map(|channel| *channel as f32 / U16_CHANNEL_MAX)
                                .collect::<Vec<_>>(),
                        )
                    }
                    _ => None,
                }
            }
            _ => None,
        };

        debug!(
            "Decoded {} points in {:.1}ms (colour: {})",
            count,
            decode_time_ms,
            colors.is_some()
        );

        Ok(DecodeResult {
            positions,
            bounds: header_bounds,
            point_count: count,
            colors,
            scale,
            offset,
            decode_time_ms,
        })
    }

    /// Ensure the module is ready, then decode. Colour is on unless
    /// `options` says otherwise.
    pub async fn decode_laz(
        &self,
        bytes: &[u8],
        options: Option<DecodeOptions>,
    ) -> Result<DecodeResult> {
        if bytes.is_empty() {
            return Err(PipelineError::EmptySource);
        }
        self.lifecycle.ensure_ready(&Default::default()).await?;

        let options = options.unwrap_or(DecodeOptions { enable_color: true });
        self.decode(bytes, &options)
    }
}

fn array<const N: usize>(region: &ForeignHeapRegion<'_>) -> Result<[f32; N]> {
    let values = region.read_f32s(N)?;
    let mut out = [0f32; N];
    out.copy_from_slice(&values);
    Ok(out)
}
