//! wgpu execution of occlusion query batches.
//!
//! Each batch draws one depth-tested point per region into the depth buffer the
//! main pass just produced, with an occlusion query around every draw. Results are
//! resolved into a buffer, copied to a `MAP_READ` buffer and mapped after submit.
//! A ring of [`QUERY_RING_SIZE`] slots keeps a slot free while earlier batches
//! are still being read back, so nothing ever waits on the GPU.

use futures::channel::oneshot;

use super::{BatchResult, QueryBatch};
use crate::renderer::DEPTH_FORMAT;

/// Number of read-back slots in flight.
pub const QUERY_RING_SIZE: usize = 3;

/// Maximum number of point queries per batch.
pub const QUERY_CAPACITY: u32 = 1024;

const RESULT_SIZE: wgpu::BufferAddress = std::mem::size_of::<u64>() as wgpu::BufferAddress;

type MapReceiver = oneshot::Receiver<Result<(), wgpu::BufferAsyncError>>;

enum SlotState {
    Free,
    /// Recorded into an encoder that has not been submitted yet.
    Recorded { batch: u64, count: u32 },
    Mapping { batch: u64, count: u32, receiver: MapReceiver },
}

struct QuerySlot {
    query_set: wgpu::QuerySet,
    positions: wgpu::Buffer,
    resolve_buffer: wgpu::Buffer,
    readback_buffer: wgpu::Buffer,
    state: SlotState,
}

impl QuerySlot {
    fn new(device: &wgpu::Device, index: usize) -> Self {
        let results_size = RESULT_SIZE * QUERY_CAPACITY as wgpu::BufferAddress;
        Self {
            query_set: device.create_query_set(&wgpu::QuerySetDescriptor {
                label: Some(&format!("Occlusion Query Set {index}")),
                ty: wgpu::QueryType::Occlusion,
                count: QUERY_CAPACITY,
            }),
            positions: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("Occlusion Positions {index}")),
                size: (std::mem::size_of::<[f32; 3]>() as u32 * QUERY_CAPACITY) as wgpu::BufferAddress,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            resolve_buffer: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("Occlusion Resolve {index}")),
                size: results_size,
                usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            }),
            readback_buffer: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("Occlusion Readback {index}")),
                size: results_size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            state: SlotState::Free,
        }
    }
}

/// Ring of occlusion query slots plus the depth-only point pipeline.
pub struct GpuOcclusionQueries {
    slots: Vec<QuerySlot>,
    pipeline: wgpu::RenderPipeline,
}

impl GpuOcclusionQueries {
    pub(crate) fn new(
        device: &wgpu::Device,
        shader: &wgpu::ShaderModule,
        camera_bind_group_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Occlusion Pipeline Layout"),
            bind_group_layouts: &[camera_bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Occlusion Point Pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: shader,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[wgpu::VertexAttribute {
                        offset: 0,
                        shader_location: 0,
                        format: wgpu::VertexFormat::Float32x3,
                    }],
                }],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            // Depth-only: no color writes.
            fragment: None,
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::PointList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
            cache: None,
        });

        let slots = (0..QUERY_RING_SIZE).map(|i| QuerySlot::new(device, i)).collect();
        Self { slots, pipeline }
    }

    /// Number of queries the next batch may hold: 0 while every slot is busy.
    pub fn available_capacity(&self) -> usize {
        if self.slots.iter().any(|s| matches!(s.state, SlotState::Free)) {
            QUERY_CAPACITY as usize
        } else {
            0
        }
    }

    /// Records `batch` against the main pass depth buffer.
    ///
    /// Returns false (and records nothing) when no slot is free.
    pub(crate) fn record(
        &mut self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        depth_view: &wgpu::TextureView,
        camera_bind_group: &wgpu::BindGroup,
        batch: &QueryBatch,
    ) -> bool {
        let Some(slot) = self.slots.iter_mut().find(|s| matches!(s.state, SlotState::Free)) else {
            return false;
        };
        let count = batch.queries.len().min(QUERY_CAPACITY as usize) as u32;
        if count == 0 {
            return false;
        }

        let positions: Vec<[f32; 3]> = batch
            .queries
            .iter()
            .take(count as usize)
            .map(|q| q.position.into())
            .collect();
        queue.write_buffer(&slot.positions, 0, bytemuck::cast_slice(&positions));

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Occlusion Query Pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: Some(&slot.query_set),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, camera_bind_group, &[]);
            pass.set_vertex_buffer(0, slot.positions.slice(..));
            for i in 0..count {
                pass.begin_occlusion_query(i);
                pass.draw(i..i + 1, 0..1);
                pass.end_occlusion_query();
            }
        }

        encoder.resolve_query_set(&slot.query_set, 0..count, &slot.resolve_buffer, 0);
        encoder.copy_buffer_to_buffer(
            &slot.resolve_buffer,
            0,
            &slot.readback_buffer,
            0,
            RESULT_SIZE * count as wgpu::BufferAddress,
        );
        slot.state = SlotState::Recorded { batch: batch.batch, count };
        log::debug!("Recorded occlusion batch {} ({count} queries)", batch.batch);
        true
    }

    /// Starts mapping every slot recorded this frame. Call after the encoder is submitted.
    pub(crate) fn after_submit(&mut self) {
        for slot in &mut self.slots {
            let SlotState::Recorded { batch, count } = slot.state else {
                continue;
            };
            let (sender, receiver) = oneshot::channel();
            slot.readback_buffer
                .slice(..RESULT_SIZE * count as wgpu::BufferAddress)
                .map_async(wgpu::MapMode::Read, move |result| {
                    let _ = sender.send(result);
                });
            slot.state = SlotState::Mapping { batch, count, receiver };
        }
    }

    /// Collects every batch whose read-back finished. Never blocks.
    pub(crate) fn collect(&mut self) -> Vec<BatchResult> {
        let mut results = Vec::new();
        for slot in &mut self.slots {
            let SlotState::Mapping { batch, count, receiver } = &mut slot.state else {
                continue;
            };
            let (batch, count) = (*batch, *count);
            let visible = match receiver.try_recv() {
                Ok(None) => continue,
                Ok(Some(Ok(()))) => {
                    let range = slot.readback_buffer.slice(..RESULT_SIZE * count as wgpu::BufferAddress);
                    let visible = {
                        let data = range.get_mapped_range();
                        decode_sample_counts(&data)
                    };
                    slot.readback_buffer.unmap();
                    Some(visible)
                }
                Ok(Some(Err(e))) => {
                    log::warn!("Occlusion read-back for batch {batch} failed: {e}");
                    None
                }
                Err(_) => {
                    log::warn!("Occlusion read-back for batch {batch} was dropped");
                    None
                }
            };
            slot.state = SlotState::Free;
            results.push(BatchResult { batch, visible });
        }
        results
    }
}

/// Passed-sample counts to visibility flags.
fn decode_sample_counts(bytes: &[u8]) -> Vec<bool> {
    bytes
        .chunks_exact(RESULT_SIZE as usize)
        .map(|chunk| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            u64::from_le_bytes(raw) > 0
        })
        .collect()
}
