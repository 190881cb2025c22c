//! Dynamic rendering scopes.

use ash::vk;

/// What happens to an attachment's contents when the scope opens.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LoadOp {
    Load,
    ClearColor([f32; 4]),
    ClearDepth(f32),
    DontCare,
}

impl LoadOp {
    fn vk(self) -> vk::AttachmentLoadOp {
        match self {
            Self::Load => vk::AttachmentLoadOp::LOAD,
            Self::ClearColor(_) | Self::ClearDepth(_) => vk::AttachmentLoadOp::CLEAR,
            Self::DontCare => vk::AttachmentLoadOp::DONT_CARE,
        }
    }

    fn clear_value(self) -> vk::ClearValue {
        match self {
            Self::ClearColor(float32) => vk::ClearValue {
                color: vk::ClearColorValue { float32 },
            },
            Self::ClearDepth(depth) => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil: 0 },
            },
            Self::Load | Self::DontCare => vk::ClearValue::default(),
        }
    }
}

/// One attachment of a rendering scope.
#[derive(Clone, Copy, Debug)]
pub struct AttachmentTarget {
    pub view: vk::ImageView,
    pub layout: vk::ImageLayout,
    pub load: LoadOp,
    pub store: bool,
}

impl AttachmentTarget {
    /// Colour attachment in `COLOR_ATTACHMENT_OPTIMAL`, stored.
    pub fn color(view: vk::ImageView, load: LoadOp) -> Self {
        Self {
            view,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            load,
            store: true,
        }
    }

    /// Writable depth attachment, stored.
    pub fn depth(view: vk::ImageView, load: LoadOp) -> Self {
        Self {
            view,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            load,
            store: true,
        }
    }

    /// Depth attachment used for testing only.
    pub fn depth_read_only(view: vk::ImageView) -> Self {
        Self {
            view,
            layout: vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            load: LoadOp::Load,
            store: false,
        }
    }

    fn info(&self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.view)
            .image_layout(self.layout)
            .load_op(self.load.vk())
            .store_op(if self.store {
                vk::AttachmentStoreOp::STORE
            } else {
                vk::AttachmentStoreOp::NONE
            })
            .clear_value(self.load.clear_value())
    }
}

/// Attachments and render area for one pass.
#[derive(Clone, Debug)]
pub struct RenderInfo {
    pub extent: vk::Extent2D,
    pub color: Vec<AttachmentTarget>,
    pub depth: Option<AttachmentTarget>,
}

impl RenderInfo {
    pub fn new(extent: vk::Extent2D) -> Self {
        Self {
            extent,
            color: Vec::new(),
            depth: None,
        }
    }

    #[must_use]
    pub fn with_color(mut self, target: AttachmentTarget) -> Self {
        self.color.push(target);
        self
    }

    #[must_use]
    pub fn with_depth(mut self, target: AttachmentTarget) -> Self {
        self.depth = Some(target);
        self
    }
}

/// Open a rendering scope over `info` and set a full-area viewport/scissor.
///
/// # Safety
/// The command buffer must be recording and attachments in the declared layouts.
pub unsafe fn begin_rendering(device: &ash::Device, cmd: vk::CommandBuffer, info: &RenderInfo) {
    let area = vk::Rect2D {
        offset: vk::Offset2D::default(),
        extent: info.extent,
    };
    let colors: Vec<_> = info.color.iter().map(AttachmentTarget::info).collect();
    let depth = info.depth.as_ref().map(AttachmentTarget::info);

    let mut rendering = vk::RenderingInfo::default()
        .render_area(area)
        .layer_count(1)
        .color_attachments(&colors);
    if let Some(depth) = depth.as_ref() {
        rendering = rendering.depth_attachment(depth);
    }
    device.cmd_begin_rendering(cmd, &rendering);

    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: info.extent.width as f32,
        height: info.extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };
    device.cmd_set_viewport(cmd, 0, &[viewport]);
    device.cmd_set_scissor(cmd, 0, &[area]);
}

/// Close the current rendering scope.
///
/// # Safety
/// A scope opened by [`begin_rendering`] must be active.
pub unsafe fn end_rendering(device: &ash::Device, cmd: vk::CommandBuffer) {
    device.cmd_end_rendering(cmd);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_ops_map_to_vulkan() {
        assert_eq!(LoadOp::Load.vk(), vk::AttachmentLoadOp::LOAD);
        assert_eq!(LoadOp::ClearDepth(1.0).vk(), vk::AttachmentLoadOp::CLEAR);
        assert_eq!(LoadOp::DontCare.vk(), vk::AttachmentLoadOp::DONT_CARE);
    }

    #[test]
    fn read_only_depth_is_not_stored() {
        let target = AttachmentTarget::depth_read_only(vk::ImageView::null());
        let info = target.info();
        assert_eq!(info.image_layout, vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL);
        assert_eq!(info.store_op, vk::AttachmentStoreOp::NONE);
        assert_eq!(info.load_op, vk::AttachmentLoadOp::LOAD);
    }

    #[test]
    fn builder_collects_attachments() {
        let info = RenderInfo::new(vk::Extent2D {
            width: 4,
            height: 4,
        })
        .with_color(AttachmentTarget::color(
            vk::ImageView::null(),
            LoadOp::ClearColor([0.0; 4]),
        ))
        .with_depth(AttachmentTarget::depth(
            vk::ImageView::null(),
            LoadOp::ClearDepth(1.0),
        ));
        assert_eq!(info.color.len(), 1);
        assert!(info.depth.is_some());
    }
}
