use serde::{Serialize, Deserialize};

/// Batch width window shared by the recommender and the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchSizeConfig {
    pub min_size: usize,
    pub max_size: usize,
    pub default_size: usize,
}

impl Default for BatchSizeConfig {
    fn default() -> Self {
        Self {
            min_size: 5,
            max_size: 50,
            default_size: 10,
        }
    }
}

impl BatchSizeConfig {
    pub fn clamp(&self, size: usize) -> usize {
        size.max(self.min_size).min(self.max_size)
    }

    /// Default width, kept inside the window.
    pub fn bounded_default(&self) -> usize {
        self.clamp(self.default_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_into_window() {
        let config = BatchSizeConfig::default();
        assert_eq!(config.clamp(0), 5);
        assert_eq!(config.clamp(17), 17);
        assert_eq!(config.clamp(500), 50);

        let narrow = BatchSizeConfig { min_size: 20, max_size: 30, default_size: 10 };
        assert_eq!(narrow.bounded_default(), 20);
    }
}
