use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use super::types::{PopMode, StreamData};

/**
 * Appends to a bounded deque, discarding the oldest entry when full.
 */
fn push_bounded<T>(items: &mut VecDeque<T>, maxlen: Option<usize>, value: T) {
    if let Some(maxlen) = maxlen {
        if maxlen == 0 {
            // maxlen 0 means unbounded, matching the config surface.
            items.push_back(value);
            return;
        }
        while items.len() >= maxlen {
            items.pop_front();
        }
    }
    items.push_back(value);
}

/**
 * One shared stream buffer with its own lock.
 *
 * # Fields
 * - `items`: The bounded double-ended queue.
 * - `maxlen`: Maximum length; `None` is unbounded.
 */
pub(crate) struct NamedBuffer {
    items: Mutex<VecDeque<StreamData>>,
    maxlen: Option<usize>,
}

impl NamedBuffer {
    fn new(maxlen: Option<usize>) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            maxlen,
        }
    }
}

/**
 * The manager's stream buffers: one global FIFO plus named shared buffers.
 *
 * Every buffer has its own lock; producers and consumers never contend on
 * the stream table through here.
 */
pub(crate) struct BufferSet {
    global: Mutex<VecDeque<StreamData>>,
    global_maxlen: Option<usize>,
    named: Mutex<HashMap<String, Arc<NamedBuffer>>>,
}

impl BufferSet {
    pub fn new(global_maxlen: Option<usize>) -> Self {
        Self {
            global: Mutex::new(VecDeque::new()),
            global_maxlen,
            named: Mutex::new(HashMap::new()),
        }
    }

    /**
     * Creates a named buffer if it does not exist yet.
     *
     * An existing buffer is left untouched so its content survives stream
     * restarts.
     */
    pub fn create_named(&self, name: &str, maxlen: Option<usize>) {
        let mut named = self.named.lock().unwrap();
        named
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(NamedBuffer::new(maxlen)));
    }

    fn named_buffer(&self, name: &str) -> Option<Arc<NamedBuffer>> {
        self.named.lock().unwrap().get(name).cloned()
    }

    /**
     * Appends one record to the global or a named buffer.
     *
     * # Arguments
     * - `name`: `None` targets the global buffer; otherwise the named buffer
     *   is created on demand with no length bound.
     */
    pub fn push(&self, name: Option<&str>, data: StreamData) {
        match name {
            None => {
                let mut global = self.global.lock().unwrap();
                push_bounded(&mut global, self.global_maxlen, data);
            }
            Some(name) => {
                let buffer = match self.named_buffer(name) {
                    Some(buffer) => buffer,
                    None => {
                        self.create_named(name, None);
                        match self.named_buffer(name) {
                            Some(buffer) => buffer,
                            None => return,
                        }
                    }
                };
                let mut items = buffer.items.lock().unwrap();
                push_bounded(&mut items, buffer.maxlen, data);
            }
        }
    }

    /**
     * Pops one record in FIFO or LIFO order.
     *
     * # Returns
     * - `None` when the buffer is empty or unknown.
     */
    pub fn pop(&self, name: Option<&str>, mode: PopMode) -> Option<StreamData> {
        match name {
            None => Self::pop_from(&mut self.global.lock().unwrap(), mode),
            Some(name) => {
                let buffer = self.named_buffer(name)?;
                let mut items = buffer.items.lock().unwrap();
                Self::pop_from(&mut items, mode)
            }
        }
    }

    fn pop_from(items: &mut VecDeque<StreamData>, mode: PopMode) -> Option<StreamData> {
        match mode {
            PopMode::Fifo => items.pop_front(),
            PopMode::Lifo => items.pop_back(),
        }
    }

    pub fn len(&self, name: Option<&str>) -> usize {
        match name {
            None => self.global.lock().unwrap().len(),
            Some(name) => self
                .named_buffer(name)
                .map(|buffer| buffer.items.lock().unwrap().len())
                .unwrap_or(0),
        }
    }

    pub fn maxlen(&self, name: Option<&str>) -> Option<usize> {
        match name {
            None => self.global_maxlen,
            Some(name) => self.named_buffer(name).and_then(|buffer| buffer.maxlen),
        }
    }

    /**
     * Approximate byte size of the global buffer's payloads.
     */
    pub fn global_byte_size(&self) -> usize {
        let global = self.global.lock().unwrap();
        global.iter().map(StreamData::byte_size).sum()
    }

    pub fn clear(&self, name: Option<&str>) {
        match name {
            None => self.global.lock().unwrap().clear(),
            Some(name) => {
                if let Some(buffer) = self.named_buffer(name) {
                    buffer.items.lock().unwrap().clear();
                }
            }
        }
    }

    /**
     * Drops a named buffer and all its content.
     */
    pub fn remove_named(&self, name: &str) {
        self.named.lock().unwrap().remove(name);
    }
}

/**
 * Bounded list of the most recent endpoint responses or errors.
 *
 * # Fields
 * - `items`: Most recent entries, oldest first.
 * - `max_size`: Bound; pushing beyond it evicts the oldest entry.
 */
pub(crate) struct RingBuffer {
    items: VecDeque<Value>,
    max_size: usize,
}

impl RingBuffer {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    pub fn push(&mut self, value: Value) {
        while self.items.len() >= self.max_size.max(1) {
            self.items.pop_front();
        }
        self.items.push_back(value);
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.items.iter().cloned().collect()
    }

    /**
     * Finds the most recent entry whose `req_id` or `id` matches.
     */
    pub fn find_request_id(&self, request_id: &str) -> Option<Value> {
        self.items
            .iter()
            .rev()
            .find(|value| {
                value
                    .get("req_id")
                    .or_else(|| value.get("id"))
                    .and_then(Value::as_str)
                    .is_some_and(|id| id == request_id)
            })
            .cloned()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
        while self.items.len() > self.max_size.max(1) {
            self.items.pop_front();
        }
    }
}
