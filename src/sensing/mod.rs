// Sensing side: reflectance input, classification and calibration.
// Turns raw sensor samples into the on-path / on-wall / off-path signal.

pub mod sensor;
pub mod classifier;
pub mod calibration;
