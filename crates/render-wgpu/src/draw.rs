use std::cell::RefCell;

use sensorview_resource::{BufferId, GpuModel, GpuSkybox, TextureId};

/// One thing to draw this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawCommand {
    Sky { cubemap: TextureId },
    Grid,
    Model {
        buffer: BufferId,
        albedo: Option<TextureId>,
    },
}

impl DrawCommand {
    pub fn model(model: &GpuModel) -> Self {
        Self::Model {
            buffer: model.buffer,
            albedo: model.albedo.map(|texture| texture.id),
        }
    }

    pub fn sky(skybox: &GpuSkybox) -> Self {
        Self::Sky {
            cubemap: skybox.id,
        }
    }
}

/// Commands recorded by bus callbacks during dispatch and consumed at swap.
///
/// Shared through `Rc` between the callbacks and the presenter.
#[derive(Debug, Default)]
pub struct DrawList {
    commands: RefCell<Vec<DrawCommand>>,
}

impl DrawList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, command: DrawCommand) {
        self.commands.borrow_mut().push(command);
    }

    /// Take this frame's commands, leaving the list empty.
    pub fn take(&self) -> Vec<DrawCommand> {
        std::mem::take(&mut *self.commands.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.commands.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.borrow().is_empty()
    }
}
