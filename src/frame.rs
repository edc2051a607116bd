//! Frame types flowing through the pipeline.
//!
//! A frame is any value that can report a type tag. Frames cross queue
//! boundaries as [`FrameRef`] (`Arc<dyn Frame>`): the sending stage and every
//! stage downstream of it share the same value, possibly at the same time.
//!
//! # Ownership contract
//!
//! Once a frame has been sent downstream it must not change. `FrameRef` only
//! hands out shared references, so this holds as long as frame types do not
//! use interior mutability (`Mutex`, `Cell`, atomics) for their payload. A
//! processor that wants a different value builds a new frame and sends that
//! instead (copy-before-mutate).

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Type tags of the built-in frames.
pub mod tags {
    pub const START: &str = "StartFrame";
    pub const END: &str = "EndFrame";
    pub const ERROR: &str = "ErrorFrame";
    pub const METADATA: &str = "MetadataFrame";
    pub const TEXT: &str = "TextFrame";
}

/// Upcast helper so `dyn Frame` can be downcast to its concrete type.
///
/// Implemented for every `'static` type; never implement it by hand.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A unit of data flowing through the pipeline.
///
/// `frame_type` must be cheap and must not perform I/O; it is used for
/// diagnostics and for dispatch inside processors.
///
/// # Examples
///
/// ```rust
/// use framechain::frame::{Frame, FrameRef};
/// use std::sync::Arc;
///
/// #[derive(Debug)]
/// struct Temperature(f64);
///
/// impl Frame for Temperature {
///     fn frame_type(&self) -> &str {
///         "Temperature"
///     }
/// }
///
/// let frame: FrameRef = Arc::new(Temperature(21.5));
/// assert_eq!(frame.frame_type(), "Temperature");
/// assert_eq!(frame.downcast_ref::<Temperature>().map(|t| t.0), Some(21.5));
/// ```
pub trait Frame: AsAny + fmt::Debug + Send + Sync + 'static {
    /// Stable tag identifying the kind of frame
    fn frame_type(&self) -> &str;
}

/// Shared handle to a frame, as carried by pipeline queues
pub type FrameRef = Arc<dyn Frame>;

impl dyn Frame {
    /// Borrow the frame as its concrete type, if it is one
    pub fn downcast_ref<T: Frame>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Check the concrete type of the frame
    pub fn is<T: Frame>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// Opaque payload carried by [`StartFrame`] and [`MetadataFrame`]
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Signals the beginning of a stream.
#[derive(Clone, Default)]
pub struct StartFrame {
    pub context: Option<Payload>,
}

impl StartFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context<T: Any + Send + Sync>(context: T) -> Self {
        Self {
            context: Some(Arc::new(context)),
        }
    }

    /// The context payload, if present and of type `T`
    pub fn context_as<T: Any>(&self) -> Option<&T> {
        self.context.as_ref().and_then(|c| c.downcast_ref::<T>())
    }

    pub fn into_ref(self) -> FrameRef {
        Arc::new(self)
    }
}

impl fmt::Debug for StartFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartFrame")
            .field("has_context", &self.context.is_some())
            .finish()
    }
}

impl Frame for StartFrame {
    fn frame_type(&self) -> &str {
        tags::START
    }
}

/// Signals the end of a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndFrame;

impl EndFrame {
    pub fn into_ref(self) -> FrameRef {
        Arc::new(self)
    }
}

impl Frame for EndFrame {
    fn frame_type(&self) -> &str {
        tags::END
    }
}

/// Carries an error downstream as data.
///
/// Processors emit these deliberately when a consumer of the output queue
/// needs to see a failure; the engine itself never creates them.
#[derive(Debug, Clone)]
pub struct ErrorFrame {
    pub cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
    pub message: String,
}

impl ErrorFrame {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            cause: None,
            message: message.into(),
        }
    }

    pub fn with_cause<E>(message: impl Into<String>, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            cause: Some(Arc::new(cause)),
            message: message.into(),
        }
    }

    pub fn into_ref(self) -> FrameRef {
        Arc::new(self)
    }
}

impl Frame for ErrorFrame {
    fn frame_type(&self) -> &str {
        tags::ERROR
    }
}

/// A key/value annotation travelling with the stream.
#[derive(Clone)]
pub struct MetadataFrame {
    pub key: String,
    pub value: Payload,
}

impl MetadataFrame {
    pub fn new<T: Any + Send + Sync>(key: impl Into<String>, value: T) -> Self {
        Self {
            key: key.into(),
            value: Arc::new(value),
        }
    }

    /// The value, if it is of type `T`
    pub fn value_as<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn into_ref(self) -> FrameRef {
        Arc::new(self)
    }
}

impl fmt::Debug for MetadataFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataFrame")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl Frame for MetadataFrame {
    fn frame_type(&self) -> &str {
        tags::METADATA
    }
}

/// Plain text payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFrame {
    pub text: String,
}

impl TextFrame {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn into_ref(self) -> FrameRef {
        Arc::new(self)
    }
}

impl Frame for TextFrame {
    fn frame_type(&self) -> &str {
        tags::TEXT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_frames_report_their_tags() {
        let frames: Vec<FrameRef> = vec![
            StartFrame::new().into_ref(),
            EndFrame.into_ref(),
            ErrorFrame::new("bad").into_ref(),
            MetadataFrame::new("k", 1u32).into_ref(),
            TextFrame::new("hi").into_ref(),
        ];
        let tags: Vec<&str> = frames.iter().map(|f| f.frame_type()).collect();
        assert_eq!(
            tags,
            vec![tags::START, tags::END, tags::ERROR, tags::METADATA, tags::TEXT]
        );
    }

    #[test]
    fn downcast_finds_concrete_type() {
        let frame = TextFrame::new("hello").into_ref();
        assert!(frame.is::<TextFrame>());
        assert!(!frame.is::<EndFrame>());
        assert_eq!(frame.downcast_ref::<TextFrame>().unwrap().text, "hello");
        assert!(frame.downcast_ref::<ErrorFrame>().is_none());
    }

    #[test]
    fn payload_accessors_are_typed() {
        let start = StartFrame::with_context(String::from("session-1"));
        assert_eq!(start.context_as::<String>().map(String::as_str), Some("session-1"));
        assert!(start.context_as::<u64>().is_none());

        let meta = MetadataFrame::new("attempt", 3u64);
        assert_eq!(meta.value_as::<u64>(), Some(&3));
        assert!(meta.value_as::<i32>().is_none());
    }

    #[test]
    fn copy_before_mutate_leaves_sent_frame_untouched() {
        let sent = TextFrame::new("original").into_ref();
        let observed_downstream = Arc::clone(&sent);

        // A stage that wants a different value derives a new frame.
        let derived = {
            let text = &sent.downcast_ref::<TextFrame>().unwrap().text;
            TextFrame::new(format!("{}-changed", text)).into_ref()
        };

        assert_eq!(
            observed_downstream.downcast_ref::<TextFrame>().unwrap().text,
            "original"
        );
        assert_eq!(derived.downcast_ref::<TextFrame>().unwrap().text, "original-changed");
        assert!(!Arc::ptr_eq(&sent, &derived));
    }
}
