use std::sync::Arc;

use anyhow::Context;
use wgpu::{Backends, InstanceDescriptor, SurfaceError};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalPosition,
    event::{ElementState, KeyEvent, MouseButton, Touch, TouchPhase, WindowEvent},
    event_loop::ActiveEventLoop,
    window::{Window, WindowId},
};

use crate::{
    api::Layers,
    brush::BrushParams,
    cmd::{Cmd, Tool},
    config::{self, CanvasConfig, CommandVerb, Config},
    math::{vec2, Vec2f},
    pool::CompositeMode,
    render::{rgb_color, CanvasTarget, Drawable, Gpu, Instance, Instances, Pass, StampBatcher},
    stroke::{Stroke, StrokeRasterizer},
};

/// Brush size change per `BRUSH_GROW`/`BRUSH_SHRINK` key press.
const BRUSH_SIZE_STEP: f32 = 4.0;

/// Opacity of the brush preview under the cursor.
const CURSOR_OPACITY: f32 = 0.4;

pub struct App {
    instance: wgpu::Instance,
    config: Config,
    win: Option<Win>,

    /// The interactive brush, as configured.
    brush: BrushParams,
    tool: Tool,
    raster: StrokeRasterizer,
    layers: Layers,

    /// The error that ended the event loop, if any.
    error: Option<anyhow::Error>,
}

struct Win {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    gpu: Gpu,
    canvas_config: CanvasConfig,

    canvas: Drawable,
    canvas_instances: Instances,
    batcher: StampBatcher,
    /// Brush preview, with the id of the brush it was uploaded from.
    cursor_brush: Option<(u64, Drawable)>,
    cursor_instances: Instances,

    /// Pointer position in window pixels.
    cursor_pos: Option<Vec2f>,
    stroke: Stroke,
    /// The finger that is drawing, if the stroke comes from a touch screen.
    touch_id: Option<u64>,
}

impl Win {
    fn recreate_swapchain(&self) -> anyhow::Result<()> {
        let res = self.window.inner_size();
        if res.width == 0 || res.height == 0 {
            // Minimized.
            return Ok(());
        }

        let mut config = self
            .surface
            .get_default_config(&self.gpu.adapter, res.width, res.height)
            .context("adapter does not support surface")?;
        config.format = self.gpu.format;

        log::debug!(
            "configuring window surface for {}x{} (format: {:?}, present mode: {:?}, alpha mode: {:?})",
            res.width,
            res.height,
            config.format,
            config.present_mode,
            config.alpha_mode,
        );

        self.surface.configure(&self.gpu.device, &config);
        Ok(())
    }

    fn window_size(&self) -> Vec2f {
        let size = self.window.inner_size();
        vec2(size.width as f32, size.height as f32)
    }

    fn display_scale(&self) -> f32 {
        self.canvas_config.display_scale(self.window_size())
    }

    fn to_canvas(&self, pos: Vec2f) -> Vec2f {
        self.canvas_config.to_canvas(self.window_size(), pos)
    }

    fn clear_canvas(&mut self) {
        let size = self.canvas_config.size;
        self.canvas = Drawable::empty(&self.gpu, size, size);
    }

    /// Composites pending stamps onto the canvas and presents the canvas.
    fn redraw(
        &mut self,
        raster: &mut StrokeRasterizer,
        brush: &BrushParams,
    ) -> anyhow::Result<()> {
        let st = match self.surface.get_current_texture() {
            Ok(st) => st,
            Err(err @ (SurfaceError::Outdated | SurfaceError::Lost)) => {
                log::debug!("surface error: {}", err);
                self.recreate_swapchain()?;
                self.surface
                    .get_current_texture()
                    .context("failed to acquire next frame after recreating swapchain")?
            }
            Err(SurfaceError::Timeout) => {
                log::debug!("timed out acquiring frame, skipping");
                return Ok(());
            }
            Err(e) => return Err(e).context("failed to acquire frame"),
        };

        let mut enc = self.gpu.device.create_command_encoder(&Default::default());

        raster.flush_frame(&mut CanvasTarget {
            gpu: &self.gpu,
            enc: &mut enc,
            canvas: &self.canvas,
            batcher: &mut self.batcher,
        });

        let window_size = self.window.inner_size();
        let window_size = vec2(window_size.width, window_size.height);
        let scale = self.display_scale();
        self.canvas_instances.set(
            &self.gpu,
            window_size,
            self.canvas_config.circular,
            &[Instance::new(self.window_size() * 0.5, 1.0, scale)],
        );

        let show_cursor = match self.cursor_pos {
            Some(pos) if !self.stroke.is_drawing() => {
                let texture = raster.brush(brush);
                if self.cursor_brush.as_ref().map(|(id, _)| *id) != Some(texture.id()) {
                    let drawable = Drawable::from_brush(&self.gpu, &texture);
                    self.cursor_brush = Some((texture.id(), drawable));
                }
                self.cursor_instances.set(
                    &self.gpu,
                    window_size,
                    false,
                    &[Instance::new(pos, CURSOR_OPACITY, scale)],
                );
                true
            }
            _ => false,
        };

        let mut pass = Pass::new(
            &self.gpu,
            &mut enc,
            &st.texture,
            Some(rgb_color(self.canvas_config.background)),
        );
        pass.draw(&self.canvas, &self.canvas_instances, 0..1, CompositeMode::Normal);
        if let (true, Some((_, cursor))) = (show_cursor, &self.cursor_brush) {
            pass.draw(cursor, &self.cursor_instances, 0..1, CompositeMode::Normal);
        }
        drop(pass);

        self.gpu.queue.submit([enc.finish()]);
        self.window.pre_present_notify();
        st.present();
        Ok(())
    }
}

impl App {
    pub fn new(config: Config) -> Self {
        Self {
            instance: wgpu::Instance::new(&InstanceDescriptor {
                backends: Backends::PRIMARY,
                ..Default::default()
            }),
            brush: config.brush,
            config,
            win: None,
            tool: Tool::Draw,
            raster: StrokeRasterizer::new(),
            layers: Layers::new(),
            error: None,
        }
    }

    /// Takes the error that made the event loop exit.
    pub fn take_error(&mut self) -> Option<anyhow::Error> {
        self.error.take()
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::debug!("exiting event loop: {error:#}");
        self.error.get_or_insert(error);
        event_loop.exit();
    }

    fn create_win(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<Win> {
        let window = Arc::new(
            event_loop.create_window(Window::default_attributes().with_title("Graffiti"))?,
        );

        let surface = self.instance.create_surface(window.clone())?;
        let gpu = Gpu::new(&self.instance, &surface)?;

        let canvas_config = self.config.canvas.clone();
        log::debug!(
            "creating {0}x{0} canvas, format={1:?}",
            canvas_config.size,
            gpu.format
        );
        let canvas = Drawable::empty(&gpu, canvas_config.size, canvas_config.size);

        let win = Win {
            canvas_instances: Instances::new(&gpu),
            batcher: StampBatcher::new(&gpu),
            cursor_instances: Instances::new(&gpu),
            cursor_brush: None,
            window,
            surface,
            gpu,
            canvas_config,
            canvas,
            cursor_pos: None,
            stroke: Stroke::default(),
            touch_id: None,
        };
        win.recreate_swapchain()?;
        Ok(win)
    }

    /// The brush pointer strokes are drawn with right now.
    fn active_brush(&self) -> BrushParams {
        BrushParams {
            erase: self.brush.erase || self.tool == Tool::Erase,
            ..self.brush
        }
    }

    fn handle_cmd(&mut self, cmd: Cmd) {
        match cmd {
            Cmd::Clear => {
                log::info!("clearing canvas");
                self.raster.discard_pending();
                if let Some(win) = &mut self.win {
                    win.clear_canvas();
                }
            }
            Cmd::SetTool { tool } => {
                log::debug!("switching to {tool:?}");
                self.tool = tool;
            }
            Cmd::ResizeBrush { delta } => {
                let (min, max) = config::BRUSH_SIZE_RANGE;
                self.brush.size = (self.brush.size + delta).clamp(min, max);
                log::info!("brush size is now {}", self.brush.size);
            }
            Cmd::Api(call) => {
                if !self.layers.apply(call, &self.brush, &mut self.raster) {
                    return;
                }
            }
        }

        if let Some(win) = &self.win {
            win.window.request_redraw();
        }
    }

    fn key_input(&mut self, event: &KeyEvent) {
        if event.repeat {
            return;
        }
        let key = config::Key::from_logical(&event.logical_key);
        let Some(&verb) = self.config.bind.get(&key) else {
            return;
        };

        let pressed = event.state == ElementState::Pressed;
        let cmd = match verb {
            CommandVerb::ToolEraser => Cmd::SetTool {
                tool: if pressed { Tool::Erase } else { Tool::Draw },
            },
            _ if !pressed => return,
            CommandVerb::Clear => Cmd::Clear,
            CommandVerb::BrushGrow => Cmd::ResizeBrush {
                delta: BRUSH_SIZE_STEP,
            },
            CommandVerb::BrushShrink => Cmd::ResizeBrush {
                delta: -BRUSH_SIZE_STEP,
            },
        };
        self.handle_cmd(cmd);
    }

    fn pointer_moved(&mut self, position: Vec2f) {
        let brush = self.active_brush();
        let Some(win) = &mut self.win else { return };

        win.cursor_pos = Some(position);
        let position = win.to_canvas(position);
        if let Some((old, new)) = win.stroke.move_to(position) {
            self.raster.add_segment(old, new, &brush);
        }
        win.window.request_redraw();
    }

    fn touch(&mut self, touch: Touch) {
        let position = to_vec2(touch.location);
        let Some(win) = &mut self.win else { return };

        match touch.phase {
            TouchPhase::Started if win.touch_id.is_none() => {
                win.touch_id = Some(touch.id);
                let position = win.to_canvas(position);
                win.stroke.begin(position);
            }
            TouchPhase::Moved if win.touch_id == Some(touch.id) => {
                self.pointer_moved(position);
                // A finger has no hover position to preview the brush at.
                if let Some(win) = &mut self.win {
                    win.cursor_pos = None;
                }
            }
            TouchPhase::Ended | TouchPhase::Cancelled if win.touch_id == Some(touch.id) => {
                win.touch_id = None;
                win.stroke.end();
            }
            _ => {}
        }
    }
}

fn to_vec2(position: PhysicalPosition<f64>) -> Vec2f {
    vec2(position.x as f32, position.y as f32)
}

impl ApplicationHandler<Cmd> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.win.is_none() {
            match self.create_win(event_loop) {
                Ok(win) => self.win = Some(win),
                Err(e) => self.fail(event_loop, e.context("could not create window")),
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.win.is_none() {
            return;
        }

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::RedrawRequested => {
                let brush = self.active_brush();
                let res = match &mut self.win {
                    Some(win) => win.redraw(&mut self.raster, &brush),
                    None => Ok(()),
                };
                if let Err(e) = res {
                    self.fail(event_loop, e);
                }
            }
            WindowEvent::Resized(_) => {
                let res = match &self.win {
                    Some(win) => win.recreate_swapchain().map(|()| win.window.request_redraw()),
                    None => Ok(()),
                };
                if let Err(e) = res {
                    self.fail(event_loop, e);
                }
            }
            WindowEvent::CursorMoved { position, .. } => self.pointer_moved(to_vec2(position)),
            WindowEvent::CursorLeft { .. } => {
                if let Some(win) = &mut self.win {
                    win.cursor_pos = None;
                    win.window.request_redraw();
                }
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                if let Some(win) = &mut self.win {
                    match (state, win.cursor_pos) {
                        (ElementState::Pressed, Some(pos)) => {
                            let pos = win.to_canvas(pos);
                            win.stroke.begin(pos);
                        }
                        (ElementState::Pressed, None) => {}
                        (ElementState::Released, _) => win.stroke.end(),
                    }
                    win.window.request_redraw();
                }
            }
            WindowEvent::Touch(touch) => self.touch(touch),
            WindowEvent::KeyboardInput { event, .. } => self.key_input(&event),
            _ => {}
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, cmd: Cmd) {
        self.handle_cmd(cmd);
    }
}
