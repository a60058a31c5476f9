/// Loss limit measured against the reference balance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawdownGuard {
    /// Fraction of the reference that may be lost before tripping (0.7 = 70%)
    pub max_loss_fraction: f64,
}

impl Default for DrawdownGuard {
    fn default() -> Self {
        Self {
            max_loss_fraction: 0.7,
        }
    }
}

/// One drawdown evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawdownReading {
    pub reference_balance: f64,
    pub total_equity: f64,
    /// max(0, reference - equity)
    pub loss: f64,
    /// loss / reference, 0 when the reference is not positive
    pub loss_ratio: f64,
}

/// The loss limit was reached
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawdownTrip {
    pub reading: DrawdownReading,
    pub max_loss_fraction: f64,
}

impl DrawdownGuard {
    pub fn new(max_loss_fraction: f64) -> Self {
        Self { max_loss_fraction }
    }

    pub fn evaluate(&self, reference_balance: f64, total_equity: f64) -> DrawdownReading {
        let loss = (reference_balance - total_equity).max(0.0);
        let loss_ratio = if reference_balance > 0.0 {
            loss / reference_balance
        } else {
            0.0
        };

        DrawdownReading {
            reference_balance,
            total_equity,
            loss,
            loss_ratio,
        }
    }

    /// Trips once the loss ratio reaches the limit; equality counts
    pub fn check(
        &self,
        reference_balance: f64,
        total_equity: f64,
    ) -> Result<DrawdownReading, DrawdownTrip> {
        let reading = self.evaluate(reference_balance, total_equity);

        if reading.loss_ratio >= self.max_loss_fraction {
            return Err(DrawdownTrip {
                reading,
                max_loss_fraction: self.max_loss_fraction,
            });
        }

        Ok(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drawdown_trips_past_limit() {
        let guard = DrawdownGuard::new(0.70);

        let trip = guard.check(100.0, 29.0).unwrap_err();

        assert!((trip.reading.loss_ratio - 0.71).abs() < 1e-9);
        assert_eq!(trip.reading.loss, 71.0);
        assert_eq!(trip.max_loss_fraction, 0.70);
    }

    #[test]
    fn test_drawdown_ok_below_limit() {
        let guard = DrawdownGuard::new(0.70);

        let reading = guard.check(100.0, 31.0).unwrap();

        assert!((reading.loss_ratio - 0.69).abs() < 1e-9);
    }

    #[test]
    fn test_drawdown_trips_at_exact_limit() {
        let guard = DrawdownGuard::new(0.5);
        assert!(guard.check(100.0, 50.0).is_err());
    }

    #[test]
    fn test_gain_is_zero_loss() {
        let reading = DrawdownGuard::default().evaluate(100.0, 140.0);
        assert_eq!(reading.loss, 0.0);
        assert_eq!(reading.loss_ratio, 0.0);
    }

    #[test]
    fn test_non_positive_reference_never_trips() {
        let guard = DrawdownGuard::default();
        assert_eq!(guard.evaluate(0.0, -50.0).loss_ratio, 0.0);
        assert!(guard.check(-10.0, -100.0).is_ok());
    }
}
