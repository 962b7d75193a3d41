//! Alert classifier - sensor readings to at most one alert per tick
//!
//! Pure and stateless. Priority when several conditions hold at once is
//! Fall > LowSpO2 > Gas > Manual. Warning bands (elevated motion, moderate
//! gas) stay local and never reach the wire.

use crate::contracts::{AlertPayload, AlertType, EmergencyPacket, MacAddress};
use crate::{
    FALL_ACCEL_THRESHOLD, FALL_ACCEL_WARNING, GAS_HAZARDOUS, GAS_MODERATE, SPO2_CRITICAL,
    SPO2_WARNING,
};

/// Fall probability reported exactly at the fall threshold
pub const FALL_PROB_AT_THRESHOLD: f32 = 0.85;

/// Fall probability reported in the elevated-motion band
pub const FALL_PROB_WARNING: f32 = 0.30;

/// Fall probability reported for calm motion
pub const FALL_PROB_CALM: f32 = 0.05;

/// Raw three-axis accelerometer sample in g
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AccelSample {
    pub ax: f32,
    pub ay: f32,
    pub az: f32,
}

impl AccelSample {
    pub fn new(ax: f32, ay: f32, az: f32) -> Self {
        Self { ax, ay, az }
    }

    pub fn magnitude(&self) -> f32 {
        (self.ax * self.ax + self.ay * self.ay + self.az * self.az).sqrt()
    }
}

/// Latest values from the sensor drivers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReadings {
    /// g-force magnitude
    pub accel_magnitude: f32,
    /// 0 – 100 %
    pub spo2: u8,
    pub heart_rate: u16,
    pub gas_ppm: f32,
    /// External panic button / manual input
    pub manual_trigger: bool,
}

impl SensorReadings {
    pub fn from_accel(accel: AccelSample, spo2: u8, heart_rate: u16, gas_ppm: f32) -> Self {
        Self {
            accel_magnitude: accel.magnitude(),
            spo2,
            heart_rate,
            gas_ppm,
            manual_trigger: false,
        }
    }
}

impl Default for SensorReadings {
    /// A resting wearer: 1 g, normal oxygen, clean air
    fn default() -> Self {
        Self {
            accel_magnitude: 1.0,
            spo2: 98,
            heart_rate: 72,
            gas_ppm: 0.0,
            manual_trigger: false,
        }
    }
}

/// Severity the gateway re-derives from the packet contents
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    /// Severity implied by a received alert.
    ///
    /// LowSpO2 is the only graded type; unrecognized types are treated as
    /// critical so nothing unknown is under-reported.
    pub fn of(packet: &EmergencyPacket) -> Self {
        match packet.alert_type {
            AlertType::LowSpO2 if packet.payload.spo2 >= SPO2_CRITICAL => Self::Warning,
            _ => Self::Critical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spo2Status {
    Normal,
    Low,
    Critical,
}

impl Spo2Status {
    pub fn of(spo2: u8) -> Self {
        if spo2 < SPO2_CRITICAL {
            Self::Critical
        } else if spo2 < SPO2_WARNING {
            Self::Low
        } else {
            Self::Normal
        }
    }
}

/// Coarse motion label shown on the node's local status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Stationary,
    Stable,
    Walking,
    HighMotion,
}

impl Activity {
    pub fn of(accel_magnitude: f32) -> Self {
        if accel_magnitude < 0.5 {
            Self::Stationary
        } else if accel_magnitude < 1.2 {
            Self::Stable
        } else if accel_magnitude < 2.0 {
            Self::Walking
        } else {
            Self::HighMotion
        }
    }
}

/// Conditions worth showing locally that do not raise an alert packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalWarnings {
    /// Between the motion warning and fall thresholds
    pub elevated_motion: bool,
    /// Between the moderate and hazardous gas thresholds
    pub gas_monitor: bool,
    pub spo2: Spo2Status,
}

impl LocalWarnings {
    pub fn any(&self) -> bool {
        self.elevated_motion || self.gas_monitor || self.spo2 != Spo2Status::Normal
    }
}

/// An alert the originator should flood
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Alert {
    pub alert_type: AlertType,
    pub severity: Severity,
    pub payload: AlertPayload,
}

impl Alert {
    pub fn into_packet(self, origin: MacAddress, timestamp: u32) -> EmergencyPacket {
        EmergencyPacket::alert(origin, timestamp, self.alert_type, self.payload)
    }
}

/// Result of one classifier tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub alert: Option<Alert>,
    pub warnings: LocalWarnings,
    pub activity: Activity,
    pub fall_prob: f32,
}

/// Fall probability for a magnitude, clamped to [0, 1].
///
/// At the threshold the value is 0.85 and it rises linearly to 1.0 at twice
/// the threshold.
pub fn fall_probability(accel_magnitude: f32) -> f32 {
    let prob = if accel_magnitude >= FALL_ACCEL_THRESHOLD {
        let excess = (accel_magnitude - FALL_ACCEL_THRESHOLD) / FALL_ACCEL_THRESHOLD;
        FALL_PROB_AT_THRESHOLD + excess * (1.0 - FALL_PROB_AT_THRESHOLD)
    } else if accel_magnitude >= FALL_ACCEL_WARNING {
        FALL_PROB_WARNING
    } else {
        FALL_PROB_CALM
    };
    // NaN readings fall through every comparison and land here as calm
    prob.clamp(0.0, 1.0)
}

/// Evaluate one set of readings
pub fn classify(readings: &SensorReadings) -> Evaluation {
    let fall_prob = fall_probability(readings.accel_magnitude);
    let spo2 = Spo2Status::of(readings.spo2);

    let alert_type = if readings.accel_magnitude >= FALL_ACCEL_THRESHOLD {
        Some(AlertType::Fall)
    } else if spo2 != Spo2Status::Normal {
        Some(AlertType::LowSpO2)
    } else if readings.gas_ppm >= GAS_HAZARDOUS {
        Some(AlertType::Gas)
    } else if readings.manual_trigger {
        Some(AlertType::Manual)
    } else {
        None
    };

    let payload = AlertPayload {
        fall_prob,
        spo2: readings.spo2,
        heart_rate: readings.heart_rate,
        gas_ppm: readings.gas_ppm,
        accel_magnitude: readings.accel_magnitude,
    };

    let alert = alert_type.map(|alert_type| {
        let severity = match alert_type {
            AlertType::LowSpO2 if spo2 == Spo2Status::Low => Severity::Warning,
            _ => Severity::Critical,
        };
        Alert {
            alert_type,
            severity,
            payload,
        }
    });

    let warnings = LocalWarnings {
        elevated_motion: readings.accel_magnitude >= FALL_ACCEL_WARNING
            && readings.accel_magnitude < FALL_ACCEL_THRESHOLD,
        gas_monitor: readings.gas_ppm >= GAS_MODERATE && readings.gas_ppm < GAS_HAZARDOUS,
        spo2,
    };

    Evaluation {
        alert,
        warnings,
        activity: Activity::of(readings.accel_magnitude),
        fall_prob,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readings(accel: f32, spo2: u8, gas: f32) -> SensorReadings {
        SensorReadings {
            accel_magnitude: accel,
            spo2,
            gas_ppm: gas,
            ..Default::default()
        }
    }

    #[test]
    fn test_calm_readings_raise_nothing() {
        let eval = classify(&SensorReadings::default());
        assert!(eval.alert.is_none());
        assert!(!eval.warnings.any());
        assert_eq!(eval.activity, Activity::Stable);
    }

    #[test]
    fn test_low_spo2_critical() {
        let eval = classify(&readings(1.0, 88, 10.0));
        let alert = eval.alert.expect("alert expected");
        assert_eq!(alert.alert_type, AlertType::LowSpO2);
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.payload.spo2, 88);
    }

    #[test]
    fn test_low_spo2_warning_band() {
        let alert = classify(&readings(1.0, 92, 0.0)).alert.unwrap();
        assert_eq!(alert.alert_type, AlertType::LowSpO2);
        assert_eq!(alert.severity, Severity::Warning);

        assert!(classify(&readings(1.0, 96, 0.0)).alert.is_none());
        assert!(classify(&readings(1.0, 95, 0.0)).alert.is_none());
    }

    #[test]
    fn test_fall_beats_gas() {
        let eval = classify(&readings(3.1, 98, 80.0));
        assert_eq!(eval.alert.unwrap().alert_type, AlertType::Fall);
    }

    #[test]
    fn test_priority_order() {
        let all = SensorReadings {
            accel_magnitude: 3.0,
            spo2: 85,
            gas_ppm: 60.0,
            manual_trigger: true,
            ..Default::default()
        };
        assert_eq!(classify(&all).alert.unwrap().alert_type, AlertType::Fall);

        let no_fall = SensorReadings {
            accel_magnitude: 1.0,
            ..all
        };
        assert_eq!(classify(&no_fall).alert.unwrap().alert_type, AlertType::LowSpO2);

        let gas_and_manual = SensorReadings { spo2: 98, ..no_fall };
        assert_eq!(classify(&gas_and_manual).alert.unwrap().alert_type, AlertType::Gas);

        let manual = SensorReadings {
            gas_ppm: 0.0,
            ..gas_and_manual
        };
        assert_eq!(classify(&manual).alert.unwrap().alert_type, AlertType::Manual);
    }

    #[test]
    fn test_warning_bands_stay_local() {
        let eval = classify(&readings(2.0, 98, 30.0));
        assert!(eval.alert.is_none());
        assert!(eval.warnings.elevated_motion);
        assert!(eval.warnings.gas_monitor);
        assert_eq!(eval.fall_prob, FALL_PROB_WARNING);
    }

    #[test]
    fn test_gas_threshold_inclusive() {
        assert_eq!(
            classify(&readings(1.0, 98, 50.0)).alert.unwrap().alert_type,
            AlertType::Gas
        );
        assert!(classify(&readings(1.0, 98, 49.9)).alert.is_none());
    }

    #[test]
    fn test_fall_probability_scaling_and_clamp() {
        assert_eq!(fall_probability(FALL_ACCEL_THRESHOLD), FALL_PROB_AT_THRESHOLD);
        let mid = fall_probability(3.75);
        assert!(mid > FALL_PROB_AT_THRESHOLD && mid < 1.0);
        assert!((fall_probability(5.0) - 1.0).abs() < 1e-6);
        assert_eq!(fall_probability(40.0), 1.0);
        assert_eq!(fall_probability(f32::INFINITY), 1.0);
        assert_eq!(fall_probability(0.2), FALL_PROB_CALM);
    }

    #[test]
    fn test_accel_magnitude() {
        let sample = AccelSample::new(0.0, 3.0, 4.0);
        assert_eq!(sample.magnitude(), 5.0);
        let r = SensorReadings::from_accel(sample, 97, 80, 1.0);
        assert_eq!(classify(&r).alert.unwrap().alert_type, AlertType::Fall);
    }

    #[test]
    fn test_gateway_severity_rederivation() {
        let mac = MacAddress::default();
        let alert = classify(&readings(1.0, 93, 0.0)).alert.unwrap();
        assert_eq!(Severity::of(&alert.into_packet(mac, 1)), Severity::Warning);

        let alert = classify(&readings(1.0, 80, 0.0)).alert.unwrap();
        assert_eq!(Severity::of(&alert.into_packet(mac, 1)), Severity::Critical);

        let alert = classify(&readings(1.0, 98, 70.0)).alert.unwrap();
        assert_eq!(Severity::of(&alert.into_packet(mac, 1)), Severity::Critical);
    }

    #[test]
    fn test_activity_labels() {
        assert_eq!(Activity::of(0.1), Activity::Stationary);
        assert_eq!(Activity::of(1.0), Activity::Stable);
        assert_eq!(Activity::of(1.5), Activity::Walking);
        assert_eq!(Activity::of(2.2), Activity::HighMotion);
    }
}
