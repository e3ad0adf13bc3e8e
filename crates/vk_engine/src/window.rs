//! Window management using GLFW
//!
//! Creates a non-resizable Vulkan-capable window and translates key and close
//! events into [`InputActions`] between frames.

use ash::vk;
use bitflags::bitflags;
use thiserror::Error;

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW could not be initialized
    #[error("GLFW initialization failed: {0}")]
    InitializationFailed(String),

    /// The window could not be created
    #[error("Window creation failed")]
    CreationFailed,

    /// A GLFW call failed
    #[error("GLFW error: {0}")]
    GlfwError(String),
}

/// Result type for window operations
pub type WindowResult<T> = Result<T, WindowError>;

bitflags! {
    /// Actions requested by input since the last poll
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InputActions: u32 {
        /// Leave the run loop
        const QUIT = 1 << 0;
        /// Swap between the default and alternate material
        const TOGGLE_SHADER = 1 << 1;
    }
}

/// Map one GLFW event to the actions it requests
pub fn actions_for_event(event: &glfw::WindowEvent) -> InputActions {
    match event {
        glfw::WindowEvent::Close
        | glfw::WindowEvent::Key(glfw::Key::Escape, _, glfw::Action::Press, _) => InputActions::QUIT,
        glfw::WindowEvent::Key(glfw::Key::Space, _, glfw::Action::Press, _) => InputActions::TOGGLE_SHADER,
        _ => InputActions::empty(),
    }
}

/// GLFW window wrapper
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
}

impl Window {
    /// Create a window with no client API attached
    pub fn new(title: &str, width: u32, height: u32) -> WindowResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors)
            .map_err(|e| WindowError::InitializationFailed(format!("{:?}", e)))?;

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        // Extent is fixed for the lifetime of the swapchain
        glfw.window_hint(glfw::WindowHint::Resizable(false));

        let (mut window, events) = glfw
            .create_window(width, height, title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_close_polling(true);

        log::info!("Created window '{}' ({}x{})", title, width, height);
        Ok(Self { glfw, window, events })
    }

    /// Pump the event queue and collect the requested actions
    pub fn poll_input(&mut self) -> InputActions {
        self.glfw.poll_events();
        let mut actions = InputActions::empty();
        for (_, event) in glfw::flush_messages(&self.events) {
            actions |= actions_for_event(&event);
        }
        if self.window.should_close() {
            actions |= InputActions::QUIT;
        }
        actions
    }

    /// Framebuffer size in pixels
    pub fn framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width.max(0) as u32, height.max(0) as u32)
    }

    /// Instance extensions GLFW needs for surface creation
    pub fn required_instance_extensions(&self) -> WindowResult<Vec<String>> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or_else(|| WindowError::GlfwError("Vulkan is not supported by GLFW".to_string()))
    }

    /// Create a Vulkan surface for this window
    pub fn create_surface(&mut self, instance: vk::Instance) -> WindowResult<vk::SurfaceKHR> {
        let mut surface = vk::SurfaceKHR::null();
        let result = self.window.create_window_surface(instance, std::ptr::null(), &mut surface);

        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(WindowError::GlfwError(format!("Failed to create Vulkan surface: {:?}", result)))
        }
    }
}
