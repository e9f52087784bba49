use std::sync::Arc;

use crate::{
    config::LifeConfig,
    gpu::{WgpuBackend, WgslProgram},
    rendering::{DISPLAY_WGSL, FULLSCREEN_WGSL},
    sim::{Dimensions, DrawState, LIFE_WGSL, SimulationContext},
    ui::{InputAdapter, PointerTracker},
    util::now_ms,
};
use wasm_bindgen::prelude::*;
#[cfg(target_arch = "wasm32")]
use web_sys::HtmlCanvasElement;
use winit::{
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    window::{Window, WindowAttributes},
};

#[cfg(target_arch = "wasm32")]
use winit::platform::web::WindowAttributesExtWebSys;

pub mod config;
pub mod gpu;
pub mod rendering;
pub mod sim;
pub mod ui;
pub mod util;

/// The simulation as run in a window
pub type Life = SimulationContext<WgpuBackend>;

const LIFE_PROGRAM: WgslProgram = WgslProgram {
    label: "life update program",
    vertex: FULLSCREEN_WGSL,
    fragment: LIFE_WGSL,
};

const DISPLAY_PROGRAM: WgslProgram = WgslProgram {
    label: "display program",
    vertex: FULLSCREEN_WGSL,
    fragment: DISPLAY_WGSL,
};

/// Message type for events sent back to the event loop
pub enum LifeMessage {
    Initialized(Box<Life>),
    Error(String),
}

/// Logs the achieved frame rate every couple of seconds
struct FrameRateLog {
    last_log_time: f64,
    frames_since_last_log: u32,
}

impl FrameRateLog {
    const INTERVAL_MS: f64 = 2000.0;

    fn new() -> Self {
        Self {
            last_log_time: 0.0,
            frames_since_last_log: 0,
        }
    }

    fn tick(&mut self, generation: u64) {
        let now = now_ms();
        if self.last_log_time == 0.0 {
            self.last_log_time = now;
            return;
        }
        self.frames_since_last_log += 1;
        if now - self.last_log_time >= Self::INTERVAL_MS {
            let elapsed_sec = (now - self.last_log_time) / 1000.0;
            log::info!(
                "{:.1} frames/sec, generation {generation}",
                self.frames_since_last_log as f64 / elapsed_sec
            );
            self.last_log_time = now;
            self.frames_since_last_log = 0;
        }
    }
}

struct Application {
    config: LifeConfig,
    proxy: Option<EventLoopProxy<LifeMessage>>,
    life: Option<Life>,
    input: Option<InputAdapter>,
    pointer: PointerTracker,
    frame_rate: FrameRateLog,
}

impl Application {
    fn new(event_loop: &EventLoop<LifeMessage>, config: LifeConfig) -> Self {
        Self {
            config,
            proxy: Some(event_loop.create_proxy()),
            life: None,
            input: None,
            pointer: PointerTracker::default(),
            frame_rate: FrameRateLog::new(),
        }
    }

    /// Move key presses queued by page scripts onto the input queue
    #[cfg(target_arch = "wasm32")]
    fn process_control_messages(&mut self) {
        let Some(input) = self.input.as_mut() else {
            return;
        };
        CONTROL_QUEUE.with(|queue| {
            for event in queue.borrow_mut().drain(..) {
                input.push(event);
            }
        });
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        #[cfg(target_arch = "wasm32")]
        self.process_control_messages();

        let Some(life) = self.life.as_mut() else {
            return;
        };
        if let Some(input) = self.input.as_mut() {
            input.apply(life);
        }

        match life.frame() {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                // The board never resizes, so the old configuration still applies.
                life.backend_mut().reconfigure();
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("Out of memory!");
                event_loop.exit();
                return;
            }
            Err(e) => log::warn!("Surface error: {e:?}"),
        }

        self.frame_rate.tick(life.frame_count());
        life.backend().request_redraw();
    }
}

/// Build the backend and simulation for a freshly created window.
async fn build_life(
    window: Arc<Window>,
    dims: Dimensions,
    config: LifeConfig,
) -> anyhow::Result<Life> {
    let backend = WgpuBackend::new(window, dims, config.power_preference).await?;
    let life = SimulationContext::new(backend, dims, &LIFE_PROGRAM, &DISPLAY_PROGRAM).await?;
    Ok(life.with_draw_state(DrawState {
        color: config.initial_color,
        erase: false,
    }))
}

impl winit::application::ApplicationHandler<LifeMessage> for Application {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        // Setup runs once; a pending build has already taken the proxy.
        if self.life.is_some() || self.proxy.is_none() {
            return;
        }

        #[cfg(target_arch = "wasm32")]
        {
            let (dom_window, document, canvas) = match find_canvas(&self.config.canvas_id) {
                Ok(found) => found,
                Err(e) => {
                    log::error!("{e:#}");
                    return;
                }
            };

            // The board is as large as the viewport at startup and stays that size.
            let width = dom_window
                .inner_width()
                .ok()
                .and_then(|w| w.as_f64())
                .unwrap_or(1.0) as u32;
            let height = dom_window
                .inner_height()
                .ok()
                .and_then(|h| h.as_f64())
                .unwrap_or(1.0) as u32;
            let dims = Dimensions::new(width, height);
            canvas.set_width(dims.width);
            canvas.set_height(dims.height);

            install_message_box_toggle(&document, &self.config);

            let window_attrs = WindowAttributes::default().with_canvas(Some(canvas));
            match event_loop.create_window(window_attrs) {
                Ok(window) => {
                    if let Some(proxy) = self.proxy.take() {
                        // The board is sized in CSS pixels, the cursor in device pixels.
                        self.pointer = PointerTracker::with_scale(window.scale_factor());
                        let window = Arc::new(window);
                        let config = self.config.clone();

                        wasm_bindgen_futures::spawn_local(async move {
                            match build_life(window, dims, config).await {
                                Ok(life) => {
                                    let _ = proxy
                                        .send_event(LifeMessage::Initialized(Box::new(life)));
                                }
                                Err(e) => {
                                    // Error will be logged in user_event handler
                                    let _ =
                                        proxy.send_event(LifeMessage::Error(format!("{e:#}")));
                                }
                            }
                        });
                    }
                }
                Err(e) => log::error!("failed to create window: {e}"),
            };
        }

        #[cfg(not(target_arch = "wasm32"))]
        {
            let (width, height) = self.config.native_size;
            let window_attrs = WindowAttributes::default()
                .with_title(self.config.window_title.clone())
                .with_inner_size(winit::dpi::PhysicalSize::new(width, height))
                .with_resizable(false);
            match event_loop.create_window(window_attrs) {
                Ok(window) => {
                    if let Some(proxy) = self.proxy.take() {
                        let size = window.inner_size();
                        let dims = Dimensions::new(size.width, size.height);
                        let window = Arc::new(window);
                        let config = self.config.clone();

                        // On native, use pollster to block on the future
                        match pollster::block_on(build_life(window, dims, config)) {
                            Ok(life) => {
                                let _ = proxy.send_event(LifeMessage::Initialized(Box::new(life)));
                            }
                            Err(e) => {
                                let _ = proxy.send_event(LifeMessage::Error(format!("{e:#}")));
                            }
                        }
                    }
                }
                Err(e) => log::error!("failed to create window: {e}"),
            };
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                self.life = None;
                self.input = None;
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                log::debug!(
                    "ignoring resize to {}x{}; the board keeps its startup size",
                    size.width,
                    size.height
                );
            }
            #[cfg(target_arch = "wasm32")]
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                self.pointer.set_scale(scale_factor);
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            event => {
                if let Some(input_event) = self.pointer.translate(&event) {
                    if let Some(input) = self.input.as_mut() {
                        input.push(input_event);
                    }
                }
            }
        };
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: LifeMessage) {
        match event {
            LifeMessage::Initialized(life) => {
                log::info!("GPU simulation initialized successfully");
                // Request first redraw to kick off the animation loop
                life.backend().request_redraw();
                self.input = Some(InputAdapter::new(life.dimensions()));
                self.life = Some(*life);
            }
            LifeMessage::Error(e) => {
                log::error!("GPU initialization error: {e}");
                event_loop.exit();
            }
        }
    }
}

/// Locate the page's window, document and the canvas to render into
#[cfg(target_arch = "wasm32")]
fn find_canvas(
    canvas_id: &str,
) -> anyhow::Result<(web_sys::Window, web_sys::Document, HtmlCanvasElement)> {
    let dom_window = web_sys::window().ok_or_else(|| anyhow::anyhow!("could not get window"))?;
    let document = dom_window
        .document()
        .ok_or_else(|| anyhow::anyhow!("could not get document"))?;
    let canvas = document
        .get_element_by_id(canvas_id)
        .ok_or_else(|| anyhow::anyhow!("could not get element with id `{canvas_id}` as required"))?
        .dyn_into::<HtmlCanvasElement>()
        .map_err(|_| anyhow::anyhow!("`{canvas_id}` is not a canvas"))?;
    Ok((dom_window, document, canvas))
}

/// Hide the instructions overlay when its button is clicked
#[cfg(target_arch = "wasm32")]
fn install_message_box_toggle(document: &web_sys::Document, config: &LifeConfig) {
    let (Some(button), Some(message_box)) = (
        document.get_element_by_id(&config.hide_button_id),
        document.get_element_by_id(&config.message_box_id),
    ) else {
        log::debug!("page has no message box to hide");
        return;
    };
    let Ok(message_box) = message_box.dyn_into::<web_sys::HtmlElement>() else {
        log::warn!("`{}` is not an html element", config.message_box_id);
        return;
    };

    let on_click = Closure::<dyn FnMut(web_sys::Event)>::new(move |event: web_sys::Event| {
        // Keep the click from reaching the board underneath.
        event.stop_immediate_propagation();
        if let Err(e) = message_box.style().set_property("display", "none") {
            log::warn!("could not hide message box: {e:?}");
        }
    });
    if let Err(e) =
        button.add_event_listener_with_callback("click", on_click.as_ref().unchecked_ref())
    {
        log::warn!("could not attach hide button handler: {e:?}");
    }
    // The listener lives as long as the page.
    on_click.forget();
}

#[wasm_bindgen(start)]
pub fn initialize() {
    console_error_panic_hook::set_once();
    let _ = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {}] {}",
                record.level(),
                record.target(),
                message
            ))
        })
        .level(LifeConfig::default().log_level)
        .chain(fern::Output::call(console_log::log))
        .apply();
}

// Thread-local storage for control messages (WASM is single-threaded)
#[cfg(target_arch = "wasm32")]
thread_local! {
    static CONTROL_QUEUE: std::cell::RefCell<Vec<ui::InputEvent>> = const { std::cell::RefCell::new(Vec::new()) };
}

/// Lets page scripts drive the board alongside keyboard input
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub struct LifeController;

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
impl LifeController {
    /// Queue a key press, as if typed on the board (`r`, `g`, `b`, `e` or `c`)
    #[wasm_bindgen]
    pub fn press_key(key: &str) {
        let Some(key) = key.chars().next() else {
            return;
        };
        CONTROL_QUEUE.with(|q| q.borrow_mut().push(ui::InputEvent::Key(key)));
    }

    /// Clear the whole board on the next frame
    #[wasm_bindgen]
    pub fn clear_board() {
        Self::press_key("c");
    }
}

/// Start the simulation in the page's canvas
#[wasm_bindgen]
pub fn start() {
    if let Err(e) = run(LifeConfig::default()) {
        log::error!("{e:#}");
    }
}

/// Create the event loop and run the simulation until the window closes.
pub fn run(config: LifeConfig) -> anyhow::Result<()> {
    log::info!("Starting ping-pong life");

    let event_loop = EventLoop::<LifeMessage>::with_user_event().build()?;

    // On web, we need to spawn the event loop
    #[cfg(target_arch = "wasm32")]
    {
        use winit::platform::web::EventLoopExtWebSys;
        let app = Application::new(&event_loop, config);
        event_loop.spawn_app(app);
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        let mut app = Application::new(&event_loop, config);
        event_loop.run_app(&mut app)?;
    }

    Ok(())
}
