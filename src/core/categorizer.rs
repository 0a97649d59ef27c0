use crate::domain::model::Category;

/// Percent cut-offs; each boundary belongs to the higher band.
pub const MODERATE_FROM_PERCENT: f64 = 30.0;
pub const HIGH_FROM_PERCENT: f64 = 60.0;

/// NaN maps to `High`. The scorer refuses non-finite margins before a
/// probability reaches this point.
pub fn categorize(probability: f64) -> Category {
    if probability.is_nan() {
        return Category::High;
    }
    let percent = probability * 100.0;
    if percent < MODERATE_FROM_PERCENT {
        Category::Low
    } else if percent < HIGH_FROM_PERCENT {
        Category::Moderate
    } else {
        Category::High
    }
}
