pub struct DispatchConfig {
    offload_firing: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            offload_firing: false,
        }
    }
}
impl DispatchConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn is_firing_offloaded(&self) -> bool {
        self.offload_firing
    }
    /// Hand each fired task to the rayon global pool instead of running it
    /// inline on the expiry-delivery thread. Lowers dispatch latency when
    /// tasks are slow, at the cost of in-bucket ordering.
    pub fn offload_firing(mut self, offload: bool) -> Self {
        self.offload_firing = offload;
        self
    }
}
