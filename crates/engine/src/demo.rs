use chrono::{Days, Utc};

use stocktrail_core::{Lot, LotPayload, Product, Unit};

/// Fixed demo data set seeded the first time local mode is entered with no
/// prior stored state. Names and quantities are stable; expiry dates are
/// relative to today so the demo lots never start out expired.
pub fn demo_products() -> Vec<Product> {
    let today = Utc::now().date_naive();

    let mut chlorine = Product::new("Liquid Chlorine", Unit::Liters, 0.0);
    chlorine.lots = vec![
        Lot::new(
            chlorine.id,
            &LotPayload {
                quantity: 200.0,
                expiry_date: today + Days::new(90),
            },
        ),
        Lot::new(
            chlorine.id,
            &LotPayload {
                quantity: 150.0,
                expiry_date: today + Days::new(180),
            },
        ),
    ];
    chlorine.quantity = chlorine.lots.iter().map(|l| l.quantity).sum();

    let detergent = Product::new("Neutral Detergent", Unit::Liters, 80.0);
    let soda = Product::new("Caustic Soda", Unit::Kilograms, 45.5);

    vec![chlorine, detergent, soda]
}
