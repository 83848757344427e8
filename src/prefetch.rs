use crate::{config::PreloadConfig, mode::ReadingMode, surface::SurfaceMetrics};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PrefetchRequest {
    pub previous: bool,
    pub next: bool,
}

/// Asks for the window to grow once the reader gets close to one of its edges.
///
/// Repeated requests while a load is in flight are fine: the window's
/// admission check turns them away until the slot is idle again.
#[derive(Clone, Debug, Default)]
pub struct PrefetchTrigger {
    threshold: PreloadConfig,
}

impl PrefetchTrigger {
    pub fn new(threshold: PreloadConfig) -> Self {
        Self { threshold }
    }

    pub fn set_threshold(&mut self, threshold: PreloadConfig) {
        self.threshold = threshold;
    }

    pub fn evaluate(
        &self,
        mode: ReadingMode,
        metrics: &SurfaceMetrics,
        current_index: Option<usize>,
        total_pages: usize,
    ) -> PrefetchRequest {
        if total_pages == 0 {
            return PrefetchRequest::default();
        }
        if mode.is_paged() {
            let Some(index) = current_index else {
                return PrefetchRequest::default();
            };
            let pages = self.threshold.pages;
            PrefetchRequest {
                previous: index < pages,
                next: total_pages.saturating_sub(1).saturating_sub(index) < pages,
            }
        } else {
            if metrics.viewport_extent <= 0.0 {
                return PrefetchRequest::default();
            }
            let reach = self.threshold.viewports * metrics.viewport_extent;
            PrefetchRequest {
                previous: metrics.distance_to_start() < reach,
                next: metrics.distance_to_end() < reach,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger(viewports: f32, pages: usize) -> PrefetchTrigger {
        PrefetchTrigger::new(PreloadConfig { viewports, pages })
    }

    #[test]
    fn continuous_triggers_near_either_edge() {
        let trigger = trigger(1.0, 2);
        let mode = ReadingMode::ContinuousVertical;
        let top = SurfaceMetrics::uniform(50.0, 100.0, 200.0, 20);
        assert_eq!(trigger.evaluate(mode, &top, None, 20), PrefetchRequest { previous: true, next: false });

        let middle = SurfaceMetrics::uniform(900.0, 100.0, 200.0, 20);
        assert_eq!(trigger.evaluate(mode, &middle, None, 20), PrefetchRequest::default());

        let bottom = SurfaceMetrics::uniform(1750.0, 100.0, 200.0, 20);
        assert_eq!(trigger.evaluate(mode, &bottom, None, 20), PrefetchRequest { previous: false, next: true });
    }

    #[test]
    fn paged_counts_pages_from_boundary() {
        let trigger = trigger(1.0, 2);
        let mode = ReadingMode::PagedLeftToRight;
        let metrics = SurfaceMetrics::default();
        assert!(trigger.evaluate(mode, &metrics, Some(1), 10).previous);
        assert!(!trigger.evaluate(mode, &metrics, Some(2), 10).previous);
        assert!(trigger.evaluate(mode, &metrics, Some(8), 10).next);
        assert!(!trigger.evaluate(mode, &metrics, Some(7), 10).next);
        assert_eq!(trigger.evaluate(mode, &metrics, None, 10), PrefetchRequest::default());
    }

    #[test]
    fn empty_window_never_triggers() {
        let trigger = trigger(10.0, 10);
        let metrics = SurfaceMetrics::uniform(0.0, 100.0, 200.0, 0);
        assert_eq!(
            trigger.evaluate(ReadingMode::ContinuousVertical, &metrics, None, 0),
            PrefetchRequest::default()
        );
    }
}
