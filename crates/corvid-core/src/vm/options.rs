//! VM configuration

/// Options for creating a [`Vm`](super::Vm)
#[derive(Debug, Clone)]
pub struct VmOptions {
    /// Live object count that triggers the first collection.
    ///
    /// Zero collects before every allocation, which is useful for shaking
    /// out rooting bugs.
    pub gc_threshold: usize,

    /// Growth of the threshold after a collection, in percent of the
    /// surviving live count
    pub gc_growth_percent: usize,

    /// Maximum number of nested closure calls
    pub max_call_depth: usize,

    /// Initial operand stack capacity (in slots)
    pub stack_capacity: usize,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            gc_threshold: 1024,
            gc_growth_percent: 50,
            max_call_depth: 1024,
            stack_capacity: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = VmOptions::default();
        assert!(options.gc_threshold > 0);
        assert!(options.max_call_depth > 0);
    }
}
