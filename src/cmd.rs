use crate::api::ApiCall;

#[derive(Debug)]
pub enum Cmd {
    Clear,

    SetTool {
        tool: Tool,
    },

    /// Changes the interactive brush diameter by `delta` canvas pixels.
    ResizeBrush {
        delta: f32,
    },

    /// A call from the programmatic control surface.
    Api(ApiCall),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    Draw,
    /// Erases regardless of the configured brush.
    Erase,
}
