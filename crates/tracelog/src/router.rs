use crate::level::Severity;

/// stdout 与 stderr 的分界级别
pub const ERROR_THRESHOLD: Severity = Severity::ERROR;

/// 按严重级别分流的过滤器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeverityFilter {
    /// 仅接收 < ERROR 的记录
    Low,
    /// 仅接收 >= ERROR 的记录
    High,
}

impl SeverityFilter {
    pub fn accepts(self, level: Severity) -> bool {
        match self {
            SeverityFilter::Low => level < ERROR_THRESHOLD,
            SeverityFilter::High => level >= ERROR_THRESHOLD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_partition_levels() {
        for value in 0..=100 {
            let level = Severity::new(value);
            let low = SeverityFilter::Low.accepts(level);
            let high = SeverityFilter::High.accepts(level);
            assert_ne!(low, high, "level {} must match exactly one stream", value);
            assert_eq!(low, value < 40);
        }
    }

    #[test]
    fn test_boundary() {
        assert!(SeverityFilter::Low.accepts(Severity::WARNING));
        assert!(!SeverityFilter::Low.accepts(Severity::ERROR));
        assert!(SeverityFilter::High.accepts(Severity::ERROR));
        assert!(SeverityFilter::High.accepts(Severity::CRITICAL));
    }
}
