use std::cell::RefCell;
use std::io::{Result as IoResult, Write};
use std::rc::Rc;

/// In-memory output sink whose clones all append to one buffer.
///
/// Hand one clone to an [`ExecutionContext`](crate::context::ExecutionContext) as its
/// output and keep another to inspect what the session printed.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    bytes: Rc<RefCell<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, decoded lossily.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes.borrow()).into_owned()
    }

    pub fn len(&self) -> usize {
        self.bytes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.bytes.borrow_mut().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_contents() {
        let buffer = SharedBuffer::new();
        let mut writer = buffer.clone();
        assert!(buffer.is_empty());

        write!(writer, "a{}", 1).unwrap();

        assert_eq!(buffer.contents(), "a1");
        assert_eq!(buffer.len(), 2);
    }
}
