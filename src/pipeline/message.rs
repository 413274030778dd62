//! Values carried on a pipeline channel.

use crate::error::StreamError;

/// One value on an output channel: an item, the end marker, or a stage error.
#[derive(Debug)]
pub enum Message<T> {
    Item(T),
    /// Graceful end of stream. The error's root cause is always an `EndMark`.
    EndOfStream(StreamError),
    /// A processing error travelling as data.
    Error(StreamError),
}

impl<T> Message<T> {
    /// End-of-stream marker annotated with `context`.
    pub fn end_mark(context: impl Into<String>) -> Self {
        Message::EndOfStream(StreamError::end_of_input().with_context(context))
    }

    /// Classify an error by its root cause: end markers end the stream,
    /// anything else travels as an error.
    pub fn from_error(err: StreamError) -> Self {
        if err.is_end_mark() {
            Message::EndOfStream(err)
        } else {
            Message::Error(err)
        }
    }

    pub fn is_item(&self) -> bool {
        matches!(self, Message::Item(_))
    }

    /// True for an end marker, including one mislabelled as `Error`.
    pub fn is_end_mark(&self) -> bool {
        match self {
            Message::Item(_) => false,
            Message::EndOfStream(_) => true,
            Message::Error(err) => err.is_end_mark(),
        }
    }

    pub fn into_item(self) -> Option<T> {
        match self {
            Message::Item(item) => Some(item),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Message<U> {
        match self {
            Message::Item(item) => Message::Item(f(item)),
            Message::EndOfStream(err) => Message::EndOfStream(err),
            Message::Error(err) => Message::Error(err),
        }
    }
}

impl<T> From<StreamError> for Message<T> {
    fn from(err: StreamError) -> Self {
        Message::from_error(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::end_mark::EndMark;

    #[test]
    fn test_end_mark_message() {
        let msg: Message<u32> = Message::end_mark("reader");
        assert!(msg.is_end_mark());
        assert!(!msg.is_item());
        match msg {
            Message::EndOfStream(err) => assert_eq!(err.to_string(), "reader: end of input"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_from_error_classifies_by_root_cause() {
        let end: Message<u32> = StreamError::wrap(EndMark).with_context("x").into();
        assert!(matches!(end, Message::EndOfStream(_)));

        let err: Message<u32> = StreamError::stage("x", "end of input").into();
        assert!(matches!(err, Message::Error(_)));
        assert!(!err.is_end_mark());
    }

    #[test]
    fn test_mislabelled_error_still_ends_stream() {
        let msg: Message<u32> = Message::Error(StreamError::end_of_input().with_context("odd"));
        assert!(msg.is_end_mark());
    }

    #[test]
    fn test_map_keeps_control_values() {
        assert_eq!(Message::Item(2).map(|v| v * 10).into_item(), Some(20));
        let end: Message<i32> = Message::end_mark("src");
        assert!(end.map(|v| v + 1).is_end_mark());
    }
}
