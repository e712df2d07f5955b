use sensorview_common::ScreenSize;

use crate::category::Category;
use crate::channel::{Channel, Connection};

/// What happened since the last frame, as far as the bus is concerned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameEvents {
    pub camera_changed: bool,
    pub resized: Option<ScreenSize>,
}

/// Callbacks invoked by one [`EventBus::dispatch_frame`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchCounts {
    pub camera: usize,
    pub resize: usize,
    pub draw: usize,
}

impl DispatchCounts {
    pub fn total(&self) -> usize {
        self.camera + self.resize + self.draw
    }
}

/// Camera-changed and screen-resized channels plus one draw channel per
/// [`Category`].
pub struct EventBus {
    camera_changed: Channel<()>,
    screen_resized: Channel<ScreenSize>,
    draw: [Channel<()>; Category::COUNT],
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            camera_changed: Channel::new("camera-changed"),
            screen_resized: Channel::new("screen-resized"),
            draw: Category::ALL.map(|category| Channel::new(category.as_str())),
        }
    }

    /// Draw/update channel of `category`.
    pub fn channel(&self, category: Category) -> &Channel<()> {
        &self.draw[category.index()]
    }

    pub fn camera_changed(&self) -> &Channel<()> {
        &self.camera_changed
    }

    pub fn screen_resized(&self) -> &Channel<ScreenSize> {
        &self.screen_resized
    }

    /// Append a draw callback to `category`.
    pub fn connect(&self, category: Category, mut callback: impl FnMut() + 'static) -> Connection {
        self.channel(category).connect(move |_| callback())
    }

    pub fn connect_camera(&self, mut callback: impl FnMut() + 'static) -> Connection {
        self.camera_changed.connect(move |_| callback())
    }

    pub fn connect_resize(&self, callback: impl FnMut(&ScreenSize) + 'static) -> Connection {
        self.screen_resized.connect(callback)
    }

    /// Revoke a subscription. Returns whether it was connected.
    pub fn disconnect(&self, connection: &Connection) -> bool {
        connection.disconnect()
    }

    /// Run every callback of `category` in connection order.
    pub fn dispatch(&self, category: Category) -> usize {
        self.channel(category).dispatch(&())
    }

    /// Per-frame dispatch: camera changed, then screen resized, then every
    /// category in declaration order.
    pub fn dispatch_frame(&self, events: &FrameEvents) -> DispatchCounts {
        let _span = tracing::trace_span!("dispatch_frame").entered();
        let mut counts = DispatchCounts::default();
        if events.camera_changed {
            counts.camera = self.camera_changed.dispatch(&());
        }
        if let Some(size) = &events.resized {
            counts.resize = self.screen_resized.dispatch(size);
        }
        for category in Category::ALL {
            counts.draw += self.dispatch(category);
        }
        counts
    }

    /// Connected callbacks per category, in dispatch order.
    pub fn subscriber_counts(&self) -> [(Category, usize); Category::COUNT] {
        Category::ALL.map(|category| (category, self.channel(category).len()))
    }

    /// Disconnect everything.
    pub fn clear(&self) {
        self.camera_changed.clear();
        self.screen_resized.clear();
        for channel in &self.draw {
            channel.clear();
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("camera_changed", &self.camera_changed.len())
            .field("screen_resized", &self.screen_resized.len())
            .field("draw", &self.subscriber_counts())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    fn push(log: &Log, entry: impl Into<String>) -> impl FnMut() + 'static {
        let log = log.clone();
        let entry = entry.into();
        move || log.borrow_mut().push(entry.clone())
    }

    #[test]
    fn models_channel_keeps_order_after_disconnect() {
        let bus = EventBus::new();
        let log: Log = Rc::default();
        let _a = bus.connect(Category::Models, push(&log, "A"));
        let b = bus.connect(Category::Models, push(&log, "B"));
        let _c = bus.connect(Category::Models, push(&log, "C"));

        bus.dispatch(Category::Models);
        assert_eq!(*log.borrow(), ["A", "B", "C"]);

        assert!(bus.disconnect(&b));
        assert!(!bus.disconnect(&b));
        log.borrow_mut().clear();
        bus.dispatch(Category::Models);
        assert_eq!(*log.borrow(), ["A", "C"]);
    }

    #[test]
    fn frame_dispatch_order_is_camera_resize_then_categories() {
        let bus = EventBus::new();
        let log: Log = Rc::default();
        let mut connections = Vec::new();
        // Connect in reverse so insertion order cannot explain the result.
        for category in Category::ALL.into_iter().rev() {
            connections.push(bus.connect(category, push(&log, category.as_str())));
        }
        let resize_log = log.clone();
        connections.push(bus.connect_resize(move |size| {
            resize_log.borrow_mut().push(format!("resize {size}"))
        }));
        connections.push(bus.connect_camera(push(&log, "camera")));

        let counts = bus.dispatch_frame(&FrameEvents {
            camera_changed: true,
            resized: Some(ScreenSize::new(800, 600)),
        });

        let mut expected = vec!["camera".to_string(), "resize 800x600".to_string()];
        expected.extend(Category::ALL.iter().map(|c| c.as_str().to_string()));
        assert_eq!(*log.borrow(), expected);
        assert_eq!(
            counts,
            DispatchCounts {
                camera: 1,
                resize: 1,
                draw: Category::COUNT
            }
        );
    }

    #[test]
    fn quiet_frame_skips_camera_and_resize() {
        let bus = EventBus::new();
        let log: Log = Rc::default();
        let _camera = bus.connect_camera(push(&log, "camera"));
        let _ground = bus.connect(Category::Ground, push(&log, "ground"));

        let counts = bus.dispatch_frame(&FrameEvents::default());
        assert_eq!(*log.borrow(), ["ground"]);
        assert_eq!(counts.total(), 1);
    }

    #[test]
    fn clear_revokes_outstanding_connections() {
        let bus = EventBus::new();
        let log: Log = Rc::default();
        let text = bus.connect(Category::Text, push(&log, "text"));
        bus.clear();
        assert_eq!(bus.dispatch(Category::Text), 0);
        assert!(!bus.disconnect(&text));
        assert!(bus.subscriber_counts().iter().all(|(_, n)| *n == 0));
    }

    #[test]
    fn callback_can_trigger_another_category() {
        let bus = Rc::new(EventBus::new());
        let log: Log = Rc::default();
        let _gui = bus.connect(Category::Gui, push(&log, "gui"));
        let chained = bus.clone();
        let _skybox = bus.connect(Category::Skybox, move || {
            chained.dispatch(Category::Gui);
        });

        bus.dispatch(Category::Skybox);
        assert_eq!(*log.borrow(), ["gui"]);
    }
}
