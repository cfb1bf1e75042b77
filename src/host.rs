//! Android `NativeActivity` host: maps winit lifecycle events onto the
//! player's entry points.

use std::sync::Arc;
use android_activity::AndroidApp;
use log::{error, info, warn};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::application::ApplicationHandler;
use winit::event::{TouchPhase, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::platform::android::EventLoopBuilderExtAndroid;
use winit::window::{Window, WindowId};

use crate::app::StereoPlayerApp;
use crate::config::PlayerConfig;
use crate::error::{GpuError, PlayerResult};
use crate::renderer::WgpuDevice;
use crate::video;
use crate::vr::BuiltinSdk;

type Player = StereoPlayerApp<WgpuDevice, BuiltinSdk<WgpuDevice>>;

struct PlayerHost {
    window: Option<Arc<Window>>,
    player: Player,
}

impl PlayerHost {
    fn new(config: PlayerConfig) -> Self {
        Self {
            window: None,
            player: StereoPlayerApp::with_inputs(config, BuiltinSdk::new(), video::inputs()),
        }
    }
}

fn create_device(window: &Window) -> Result<WgpuDevice, GpuError> {
    let instance = WgpuDevice::create_instance();
    let surface = unsafe {
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::Surface(e.to_string()))?
            .as_raw();
        let display_handle = window
            .display_handle()
            .map_err(|e| GpuError::Surface(e.to_string()))?
            .as_raw();
        instance
            .create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                raw_display_handle: display_handle,
                raw_window_handle: window_handle,
            })
            .map_err(|e| GpuError::Surface(e.to_string()))?
    };
    let size = window.inner_size();
    pollster::block_on(WgpuDevice::new(&instance, surface, size.width, size.height))
}

impl ApplicationHandler for PlayerHost {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        info!("Host resumed - creating window");

        let attrs = Window::default_attributes().with_title("Stereo Player");
        let window = match event_loop.create_window(attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                error!("Host: window creation failed: {}", e);
                event_loop.exit();
                return;
            }
        };

        // Unpause first so the surface is built now rather than deferred
        self.player.on_resume();
        match create_device(&window) {
            Ok(device) => {
                if let Err(e) = self.player.on_surface_created(device) {
                    error!("Host: surface setup failed: {}", e);
                }
            }
            Err(e) => error!("Host: no GPU device: {}", e),
        }
        window.request_redraw();
        self.window = Some(window);
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        info!("Host suspended - releasing GPU resources");
        self.player.on_pause();
        // Surface objects go before the window they were created from
        self.player.on_surface_lost();
        self.window = None;
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Host: close requested");
                self.player.on_destroy();
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                self.player.on_draw_frame();
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            WindowEvent::Resized(size) => {
                self.player.set_screen_params(size.width, size.height);
            }
            WindowEvent::Touch(touch) if touch.phase == TouchPhase::Ended => {
                self.player.on_trigger_event();
            }
            _ => {}
        }
    }
}

/// Reads `player.toml` from the app's internal data directory, if present.
fn load_config(app: &AndroidApp) -> PlayerResult<Option<PlayerConfig>> {
    match app.internal_data_path().map(|dir| dir.join("player.toml")) {
        Some(path) if path.exists() => PlayerConfig::load(&path).map(Some),
        _ => Ok(None),
    }
}

/// Android entry point
#[no_mangle]
fn android_main(app: AndroidApp) {
    let loaded = load_config(&app);
    let config = match &loaded {
        Ok(Some(config)) => config.clone(),
        _ => PlayerConfig::default(),
    };
    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(config.level_filter())
            .with_tag("StereoPlayer"),
    );
    info!("Stereo player starting");
    match loaded {
        Ok(Some(_)) => info!("Config: loaded player.toml"),
        Ok(None) => info!("Config: no player.toml, using defaults"),
        Err(e) => warn!("Config: ignoring player.toml: {}", e),
    }

    let event_loop = match EventLoop::builder().with_android_app(app).build() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            error!("Failed to create event loop: {}", e);
            return;
        }
    };

    let mut host = PlayerHost::new(config);
    if let Err(e) = event_loop.run_app(&mut host) {
        warn!("Event loop ended with error: {}", e);
    }
    host.player.on_destroy();
}
