//! Render graph: ordered passes over imported images, with the image
//! barriers between them derived from declared accesses.
//!
//! Images are tracked whole (every mip and layer together). Planning is a
//! pure function of the declared uses, so it is tested without a device.

use ash::vk;
use ember_gpu::{cmd_image_barriers, full_range, image_barrier, ImageState, Result};

/// How a pass uses an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    ColorAttachment,
    DepthAttachmentWrite,
    /// Depth test without writes.
    DepthAttachmentRead,
    /// Depth sampled from a fragment shader.
    DepthSampled,
    /// Colour image sampled from a fragment shader.
    Sampled,
    TransferSrc,
    TransferDst,
    Present,
}

impl Access {
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::ColorAttachment | Self::DepthAttachmentWrite | Self::TransferDst
        )
    }

    /// Layout plus the stage and access scope of this use.
    pub fn state(self) -> ImageState {
        use vk::{AccessFlags2 as A, ImageLayout as L, PipelineStageFlags2 as S};
        let fragment_tests = S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS;
        match self {
            Self::ColorAttachment => ImageState::COLOR_ATTACHMENT,
            Self::DepthAttachmentWrite => ImageState::DEPTH_ATTACHMENT,
            Self::DepthAttachmentRead => ImageState {
                layout: L::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
                stage: fragment_tests,
                access: A::DEPTH_STENCIL_ATTACHMENT_READ,
            },
            Self::DepthSampled => ImageState {
                layout: L::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
                stage: S::FRAGMENT_SHADER,
                access: A::SHADER_SAMPLED_READ,
            },
            Self::Sampled => ImageState::SHADER_READ,
            Self::TransferSrc => ImageState::TRANSFER_SRC,
            Self::TransferDst => ImageState::TRANSFER_DST,
            Self::Present => ImageState::PRESENT,
        }
    }
}

/// Index of an image imported into a graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageId(usize);

/// An externally owned image the graph orders accesses to.
#[derive(Clone, Copy, Debug)]
pub struct GraphImage {
    pub name: &'static str,
    pub image: vk::Image,
    pub aspect: vk::ImageAspectFlags,
    /// State the image is in when the graph starts; `None` means its
    /// contents are discarded.
    pub initial: Option<Access>,
    /// State to leave the image in after the last pass.
    pub final_access: Option<Access>,
}

impl GraphImage {
    pub fn new(name: &'static str, image: vk::Image, aspect: vk::ImageAspectFlags) -> Self {
        Self {
            name,
            image,
            aspect,
            initial: None,
            final_access: None,
        }
    }

    #[must_use]
    pub fn initial(mut self, access: Access) -> Self {
        self.initial = Some(access);
        self
    }

    #[must_use]
    pub fn final_access(mut self, access: Access) -> Self {
        self.final_access = Some(access);
        self
    }
}

/// A transition computed by [`RenderGraph::plan`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlannedBarrier {
    pub image: ImageId,
    pub src: ImageState,
    pub dst: ImageState,
}

/// Barriers to record before each pass, and after the last one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Plan {
    pub before_pass: Vec<Vec<PlannedBarrier>>,
    pub after_last: Vec<PlannedBarrier>,
}

impl Plan {
    pub fn barrier_count(&self) -> usize {
        self.before_pass.iter().map(Vec::len).sum::<usize>() + self.after_last.len()
    }
}

type RecordFn<'a> = Box<dyn FnOnce(&ash::Device, vk::CommandBuffer) -> Result<()> + 'a>;

struct GraphPass<'a> {
    name: &'static str,
    uses: Vec<(ImageId, Access)>,
    record: RecordFn<'a>,
}

/// Where a barrier lives in the plan, so later reads can widen it.
#[derive(Clone, Copy)]
enum Slot {
    Pass(usize, usize),
    Final(usize),
}

/// Planner state for one image.
struct Tracked {
    /// Scope later accesses must wait on.
    scope: ImageState,
    written: bool,
    /// The barrier that opened the current run of reads.
    read_barrier: Option<Slot>,
}

/// Ordered passes over imported images.
#[derive(Default)]
pub struct RenderGraph<'a> {
    images: Vec<GraphImage>,
    passes: Vec<GraphPass<'a>>,
}

impl<'a> RenderGraph<'a> {
    pub fn new() -> Self {
        Self {
            images: Vec::new(),
            passes: Vec::new(),
        }
    }

    pub fn import(&mut self, image: GraphImage) -> ImageId {
        self.images.push(image);
        ImageId(self.images.len() - 1)
    }

    /// Append a pass. `record` runs after the pass's barriers.
    pub fn add_pass<F>(&mut self, name: &'static str, uses: &[(ImageId, Access)], record: F)
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer) -> Result<()> + 'a,
    {
        debug_assert!(uses.iter().all(|(id, _)| id.0 < self.images.len()));
        self.passes.push(GraphPass {
            name,
            uses: uses.to_vec(),
            record: Box::new(record),
        });
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Compute every barrier.
    ///
    /// - The first use of an image with no initial state transitions from
    ///   `UNDEFINED`, ordered after all prior work.
    /// - A layout change, a write after anything, or anything after a
    ///   write needs a barrier.
    /// - Reads after reads in the same layout need none; their stages are
    ///   folded into the barrier that started the run of reads, and into
    ///   the scope a later write waits on.
    /// - After the last pass, images with a final access move to it by
    ///   the same rules.
    pub fn plan(&self) -> Plan {
        let mut plan = Plan {
            before_pass: vec![Vec::new(); self.passes.len()],
            after_last: Vec::new(),
        };
        let mut tracked: Vec<Tracked> = self
            .images
            .iter()
            .map(|image| match image.initial {
                Some(access) => Tracked {
                    scope: access.state(),
                    written: access.is_write(),
                    read_barrier: None,
                },
                None => Tracked {
                    scope: ImageState::UNDEFINED,
                    written: true,
                    read_barrier: None,
                },
            })
            .collect();

        for (pass_index, pass) in self.passes.iter().enumerate() {
            for &(id, access) in &pass.uses {
                let slot_index = plan.before_pass[pass_index].len();
                let barriers = &mut plan.before_pass[pass_index];
                if let Some(barrier) = transition(&mut tracked[id.0], id, access) {
                    barriers.push(barrier);
                    if !access.is_write() {
                        tracked[id.0].read_barrier = Some(Slot::Pass(pass_index, slot_index));
                    }
                } else if let Some(slot) = tracked[id.0].read_barrier {
                    widen(&mut plan, slot, access.state());
                }
            }
        }

        for (index, image) in self.images.iter().enumerate() {
            let Some(access) = image.final_access else {
                continue;
            };
            let id = ImageId(index);
            let slot_index = plan.after_last.len();
            if let Some(barrier) = transition(&mut tracked[index], id, access) {
                plan.after_last.push(barrier);
                if !access.is_write() {
                    tracked[index].read_barrier = Some(Slot::Final(slot_index));
                }
            } else if let Some(slot) = tracked[index].read_barrier {
                widen(&mut plan, slot, access.state());
            }
        }
        plan
    }

    /// Record every pass with its barriers into `cmd`.
    pub fn execute(self, device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
        let plan = self.plan();
        let to_vk = |barrier: &PlannedBarrier| {
            let image = &self.images[barrier.image.0];
            image_barrier(image.image, full_range(image.aspect), barrier.src, barrier.dst)
        };

        for (pass, barriers) in self.passes.into_iter().zip(&plan.before_pass) {
            let vk_barriers: Vec<_> = barriers.iter().map(to_vk).collect();
            unsafe { cmd_image_barriers(device, cmd, &vk_barriers) };
            tracing::trace!("Pass {} ({} barriers)", pass.name, vk_barriers.len());
            (pass.record)(device, cmd)?;
        }

        let finals: Vec<_> = plan.after_last.iter().map(to_vk).collect();
        unsafe { cmd_image_barriers(device, cmd, &finals) };
        Ok(())
    }
}

/// Advance `state` to `access`, returning the barrier if one is needed.
fn transition(state: &mut Tracked, id: ImageId, access: Access) -> Option<PlannedBarrier> {
    let dst = access.state();
    let needed = state.written || access.is_write() || state.scope.layout != dst.layout;
    if needed {
        let barrier = PlannedBarrier {
            image: id,
            src: state.scope,
            dst,
        };
        state.scope = dst;
        state.written = access.is_write();
        state.read_barrier = None;
        Some(barrier)
    } else {
        state.scope.stage |= dst.stage;
        state.scope.access |= dst.access;
        None
    }
}

fn widen(plan: &mut Plan, slot: Slot, with: ImageState) {
    let barrier = match slot {
        Slot::Pass(pass, index) => &mut plan.before_pass[pass][index],
        Slot::Final(index) => &mut plan.after_last[index],
    };
    barrier.dst.stage |= with.stage;
    barrier.dst.access |= with.access;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &ash::Device, _: vk::CommandBuffer) -> Result<()> {
        Ok(())
    }

    fn depth_image() -> GraphImage {
        GraphImage::new("depth", vk::Image::null(), vk::ImageAspectFlags::DEPTH)
    }

    fn color_image(name: &'static str) -> GraphImage {
        GraphImage::new(name, vk::Image::null(), vk::ImageAspectFlags::COLOR)
    }

    #[test]
    fn first_use_transitions_from_undefined() {
        let mut graph = RenderGraph::new();
        let depth = graph.import(depth_image());
        graph.add_pass("depth", &[(depth, Access::DepthAttachmentWrite)], noop);

        let plan = graph.plan();
        assert_eq!(plan.before_pass[0].len(), 1);
        let barrier = plan.before_pass[0][0];
        assert_eq!(barrier.src, ImageState::UNDEFINED);
        assert_eq!(
            barrier.dst.layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
    }

    #[test]
    fn depth_written_then_read_only() {
        let mut graph = RenderGraph::new();
        let depth = graph.import(depth_image());
        graph.add_pass("depth", &[(depth, Access::DepthAttachmentWrite)], noop);
        graph.add_pass("ao", &[(depth, Access::DepthSampled)], noop);
        graph.add_pass("lighting", &[(depth, Access::DepthAttachmentRead)], noop);
        graph.add_pass("skybox", &[(depth, Access::DepthAttachmentRead)], noop);

        let plan = graph.plan();
        assert_eq!(plan.before_pass[1].len(), 1);
        assert!(plan.before_pass[2].is_empty());
        assert!(plan.before_pass[3].is_empty());

        let to_read = plan.before_pass[1][0];
        assert!(to_read
            .src
            .access
            .contains(vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE));
        assert_eq!(
            to_read.dst.layout,
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
        );
        // The sampled read and the later depth-test reads share one barrier.
        assert!(to_read
            .dst
            .stage
            .contains(vk::PipelineStageFlags2::FRAGMENT_SHADER));
        assert!(to_read
            .dst
            .stage
            .contains(vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS));
        assert!(to_read
            .dst
            .access
            .contains(vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ));
    }

    #[test]
    fn color_written_then_sampled() {
        let mut graph = RenderGraph::new();
        let hdr = graph.import(color_image("hdr"));
        graph.add_pass("lighting", &[(hdr, Access::ColorAttachment)], noop);
        graph.add_pass("skybox", &[(hdr, Access::ColorAttachment)], noop);
        graph.add_pass("composite", &[(hdr, Access::Sampled)], noop);

        let plan = graph.plan();
        // Write after write keeps the layout but still needs ordering.
        assert_eq!(plan.before_pass[1].len(), 1);
        assert_eq!(
            plan.before_pass[1][0].src.layout,
            plan.before_pass[1][0].dst.layout
        );
        let sampled = plan.before_pass[2][0];
        assert_eq!(sampled.src, ImageState::COLOR_ATTACHMENT);
        assert_eq!(sampled.dst, ImageState::SHADER_READ);
    }

    #[test]
    fn write_after_read_waits_for_every_reader() {
        let mut graph = RenderGraph::new();
        let ao = graph.import(color_image("ao"));
        graph.add_pass("ao", &[(ao, Access::ColorAttachment)], noop);
        graph.add_pass("lighting", &[(ao, Access::Sampled)], noop);
        graph.add_pass("debug", &[(ao, Access::Sampled)], noop);
        graph.add_pass("rewrite", &[(ao, Access::ColorAttachment)], noop);

        let plan = graph.plan();
        assert!(plan.before_pass[2].is_empty());
        let war = plan.before_pass[3][0];
        assert_eq!(war.src.layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert!(war
            .src
            .stage
            .contains(vk::PipelineStageFlags2::FRAGMENT_SHADER));
    }

    #[test]
    fn final_access_transitions_after_last_pass() {
        let mut graph = RenderGraph::new();
        let swapchain = graph.import(color_image("swapchain").final_access(Access::Present));
        let untouched = graph.import(color_image("lut").final_access(Access::Sampled));
        graph.add_pass("composite", &[(swapchain, Access::ColorAttachment)], noop);

        let plan = graph.plan();
        assert_eq!(plan.after_last.len(), 2);
        assert_eq!(plan.after_last[0].image, swapchain);
        assert_eq!(
            plan.after_last[0].dst.layout,
            vk::ImageLayout::PRESENT_SRC_KHR
        );
        assert_eq!(plan.after_last[1].image, untouched);
        assert_eq!(plan.after_last[1].src, ImageState::UNDEFINED);
    }

    #[test]
    fn imported_read_state_needs_no_barrier_for_same_read() {
        let mut graph = RenderGraph::new();
        let lut = graph.import(
            color_image("lut")
                .initial(Access::Sampled)
                .final_access(Access::Sampled),
        );
        graph.add_pass("lighting", &[(lut, Access::Sampled)], noop);
        assert_eq!(graph.plan().barrier_count(), 0);
    }

    #[test]
    fn separate_images_are_tracked_independently() {
        let mut graph = RenderGraph::new();
        let a = graph.import(color_image("a"));
        let b = graph.import(color_image("b"));
        graph.add_pass("write a", &[(a, Access::ColorAttachment)], noop);
        graph.add_pass(
            "a to b",
            &[(a, Access::Sampled), (b, Access::ColorAttachment)],
            noop,
        );
        let plan = graph.plan();
        assert_eq!(plan.before_pass[1].len(), 2);
        assert_eq!(plan.before_pass[1][0].image, a);
        assert_eq!(plan.before_pass[1][1].image, b);
        assert_eq!(plan.before_pass[1][1].src, ImageState::UNDEFINED);
    }
}
