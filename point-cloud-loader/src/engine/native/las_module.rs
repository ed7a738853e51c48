use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use constants::colour::COLOUR_CHANNELS;
use constants::loading::{DECODE_PROGRESS_INTERVAL, POSITION_STRIDE};
use las::Reader;
use parking_lot::Mutex;
use tracing::debug;

use super::heap::{HeapStats, LinearHeap};
use super::module::{
    Address, DecodeArgs, ModuleFactory, ModuleHooks, ModuleInitError, NULL, NativeModule,
};
use crate::config::{ModuleConfig, format_memory};
use crate::error::{PipelineError, Result};

/// Native decoder module backed by the `las` reader.
///
/// Input and output live on a private [`LinearHeap`], so callers drive it
/// exactly as they would a compiled decoder: by address.
pub struct LasModule {
    heap: Mutex<LinearHeap>,
    hooks: Mutex<ModuleHooks>,
}

/// Host-side copy of everything one decode produced.
struct DecodedCloud {
    xyz: Vec<f32>,
    rgb: Option<Vec<u16>>,
    point_count: u32,
    bounds: [f32; 6],
    scales: [f32; 3],
    offsets: [f32; 3],
}

impl LasModule {
    pub fn new(config: &ModuleConfig) -> Self {
        Self {
            heap: Mutex::new(LinearHeap::new(
                config.memory_initial_size as usize,
                config.memory_maximum_size as usize,
            )),
            hooks: Mutex::new(ModuleHooks::default()),
        }
    }

    /// Allocation counters of the foreign heap.
    pub fn heap_stats(&self) -> HeapStats {
        self.heap.lock().stats()
    }

    fn report_error(&self, message: &str) {
        let handler = self.hooks.lock().on_error.clone();
        match handler {
            Some(handler) => handler(message),
            None => debug!("{}", message),
        }
    }

    fn report_debug(&self, message: &str) {
        let handler = self.hooks.lock().on_debug.clone();
        match handler {
            Some(handler) => handler(message),
            None => debug!("{}", message),
        }
    }

    /// Parse the input region into host memory.
    fn parse(&self, args: &DecodeArgs, want_colour: bool) -> Result<DecodedCloud> {
        let bytes = self
            .heap
            .lock()
            .read_vec(args.input, args.input_len as usize)?;

        let mut reader =
            Reader::new(Cursor::new(bytes)).map_err(|e| PipelineError::Decode(e.to_string()))?;
        let header = reader.header().clone();

        let total = header.number_of_points();
        if total == 0 {
            return Err(PipelineError::Decode("header reports zero points".into()));
        }
        let point_count = u32::try_from(total)
            .map_err(|_| PipelineError::Decode(format!("{} points exceeds u32 range", total)))?;
        let count = point_count as usize;

        let with_colour = want_colour && header.point_format().has_color;

        // The header count is untrusted; outputs must fit the heap before any host buffer is sized.
        let per_point = POSITION_STRIDE * 4 + if with_colour { COLOUR_CHANNELS * 2 } else { 0 };
        let required = (count as u64) * per_point as u64;
        let maximum = self.heap.lock().maximum() as u64;
        if required > maximum {
            return Err(PipelineError::Decode(format!(
                "header claims {} points ({}), exceeding the {} heap",
                total,
                format_memory(required),
                format_memory(maximum)
            )));
        }

        let mut xyz = vec![0f32; count * POSITION_STRIDE];
        let mut rgb = with_colour.then(|| vec![0u16; count * COLOUR_CHANNELS]);

        for (index, point) in reader.points().take(count).enumerate() {
            // Unreadable records end the pass; the remainder stays zeroed.
            let point = match point {
                Ok(point) => point,
                Err(e) => {
                    self.report_error(&format!("LASzip error: {}", e));
                    break;
                }
            };

            let base = index * POSITION_STRIDE;
            xyz[base] = point.x as f32;
            xyz[base + 1] = point.y as f32;
            xyz[base + 2] = point.z as f32;

            if let (Some(rgb), Some(colour)) = (rgb.as_mut(), point.color) {
                let base = index * COLOUR_CHANNELS;
                rgb[base] = colour.red;
                rgb[base + 1] = colour.green;
                rgb[base + 2] = colour.blue;
            }

            let decoded = index as u64 + 1;
            if decoded % DECODE_PROGRESS_INTERVAL == 0 {
                self.report_debug(&format!("decoded {}/{} points", decoded, total));
            }
        }

        let bounds = header.bounds();
        let transforms = header.transforms();

        Ok(DecodedCloud {
            xyz,
            rgb,
            point_count,
            bounds: [
                bounds.min.x as f32,
                bounds.min.y as f32,
                bounds.min.z as f32,
                bounds.max.x as f32,
                bounds.max.y as f32,
                bounds.max.z as f32,
            ],
            scales: [
                transforms.x.scale as f32,
                transforms.y.scale as f32,
                transforms.z.scale as f32,
            ],
            offsets: [
                transforms.x.offset as f32,
                transforms.y.offset as f32,
                transforms.z.offset as f32,
            ],
        })
    }

    /// Move a parsed cloud onto the heap and fill the out-parameters.
    fn publish(&self, args: &DecodeArgs, cloud: &DecodedCloud, want_colour: bool) -> Result<Address> {
        let mut heap = self.heap.lock();

        let xyz_bytes: &[u8] = bytemuck::cast_slice(&cloud.xyz);
        let xyz_address = heap.malloc(xyz_bytes.len());
        if xyz_address == NULL {
            return Err(PipelineError::ForeignAllocation {
                size: xyz_bytes.len(),
            });
        }

        let rgb_bytes: &[u8] = cloud
            .rgb
            .as_deref()
            .map(bytemuck::cast_slice::<u16, u8>)
            .unwrap_or_default();
        let rgb_address = if rgb_bytes.is_empty() {
            NULL
        } else {
            let address = heap.malloc(rgb_bytes.len());
            if address == NULL {
                heap.free(xyz_address);
                return Err(PipelineError::ForeignAllocation {
                    size: rgb_bytes.len(),
                });
            }
            address
        };

        let written = (|| -> Result<()> {
            heap.write(xyz_address, xyz_bytes)?;
            heap.write(args.out_size, &(xyz_bytes.len() as u32).to_ne_bytes())?;
            heap.write(args.bounds, bytemuck::cast_slice(&cloud.bounds))?;

            if rgb_address != NULL {
                heap.write(rgb_address, rgb_bytes)?;
            }
            if want_colour {
                heap.write(args.colour_ptr, &rgb_address.to_ne_bytes())?;
                heap.write(args.colour_size, &(rgb_bytes.len() as u32).to_ne_bytes())?;
            }
            if args.scales != NULL {
                heap.write(args.scales, bytemuck::cast_slice(&cloud.scales))?;
            }
            if args.offsets != NULL {
                heap.write(args.offsets, bytemuck::cast_slice(&cloud.offsets))?;
            }
            if args.point_count != NULL {
                heap.write(args.point_count, &cloud.point_count.to_ne_bytes())?;
            }
            Ok(())
        })();

        if let Err(e) = written {
            heap.free(xyz_address);
            if rgb_address != NULL {
                heap.free(rgb_address);
            }
            return Err(e);
        }

        Ok(xyz_address)
    }

    fn fail(&self, args: &DecodeArgs, message: &str) -> Address {
        if args.out_size != NULL {
            let _ = self.heap.lock().write(args.out_size, &0u32.to_ne_bytes());
        }
        self.report_error(&format!("LASzip error: {}", message));
        NULL
    }
}

impl NativeModule for LasModule {
    fn malloc(&self, size: usize) -> Address {
        self.heap.lock().malloc(size)
    }

    fn free(&self, address: Address) {
        let released = self.heap.lock().free(address);
        if !released {
            self.report_error(&format!("free of unknown address {:#x} ignored", address));
        }
    }

    fn write(&self, address: Address, bytes: &[u8]) -> Result<()> {
        self.heap.lock().write(address, bytes)
    }

    fn read(&self, address: Address, out: &mut [u8]) -> Result<()> {
        self.heap.lock().read(address, out)
    }

    fn decode(&self, args: &DecodeArgs) -> Address {
        if args.input == NULL || args.input_len == 0 || args.out_size == NULL || args.bounds == NULL
        {
            return self.fail(args, "invalid decode arguments");
        }

        let want_colour = args.colour_ptr != NULL && args.colour_size != NULL;
        let outcome = self
            .parse(args, want_colour)
            .and_then(|cloud| self.publish(args, &cloud, want_colour));

        match outcome {
            Ok(address) => address,
            Err(e) => self.fail(args, &e.to_string()),
        }
    }

    fn set_hooks(&self, hooks: ModuleHooks) {
        *self.hooks.lock() = hooks;
    }
}

/// Instantiates [`LasModule`]s after validating the memory sizing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LasModuleFactory;

#[async_trait]
impl ModuleFactory for LasModuleFactory {
    async fn instantiate(
        &self,
        config: &ModuleConfig,
    ) -> std::result::Result<Arc<dyn NativeModule>, ModuleInitError> {
        if config.memory_maximum_size == 0 {
            return Err(ModuleInitError::Rejected(
                "maximum memory size must be non-zero".into(),
            ));
        }
        if config.memory_initial_size > config.memory_maximum_size {
            return Err(ModuleInitError::Rejected(format!(
                "initial memory {} exceeds maximum {}",
                format_memory(config.memory_initial_size),
                format_memory(config.memory_maximum_size)
            )));
        }

        Ok(Arc::new(LasModule::new(config)))
    }
}
