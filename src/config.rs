/// Configuration for capture operations
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Size in bytes of the buffer the collector reads the conduit with.
    /// Zero is treated as one.
    pub read_chunk_size: usize,

    /// Name given to the background collector thread.
    pub collector_thread_name: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: 8192,
            collector_thread_name: "stdcapture-collector".to_string(),
        }
    }
}
