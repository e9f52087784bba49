use crate::util::Color;

/// Startup settings for the application
#[derive(Clone, Debug)]
pub struct LifeConfig {
    /// Id of the canvas element to render into on the web
    pub canvas_id: String,
    /// Id of the instructions overlay hidden by `hide_button_id`
    pub message_box_id: String,
    pub hide_button_id: String,
    pub window_title: String,
    /// Native window size in physical pixels; the browser uses its viewport
    pub native_size: (u32, u32),
    pub initial_color: Color,
    pub log_level: log::LevelFilter,
    pub power_preference: wgpu::PowerPreference,
}

impl Default for LifeConfig {
    fn default() -> Self {
        Self {
            canvas_id: "gl".to_string(),
            message_box_id: "messagebox".to_string(),
            hide_button_id: "hidebutton".to_string(),
            window_title: "Ping-pong Life".to_string(),
            native_size: (1024, 768),
            initial_color: Color::RED,
            log_level: log::LevelFilter::Info,
            power_preference: wgpu::PowerPreference::HighPerformance,
        }
    }
}

impl LifeConfig {
    pub fn with_canvas_id(mut self, id: impl Into<String>) -> Self {
        self.canvas_id = id.into();
        self
    }

    pub fn with_native_size(mut self, width: u32, height: u32) -> Self {
        self.native_size = (width, height);
        self
    }

    pub fn with_initial_color(mut self, color: Color) -> Self {
        self.initial_color = color;
        self
    }

    pub fn with_log_level(mut self, level: log::LevelFilter) -> Self {
        self.log_level = level;
        self
    }
}
