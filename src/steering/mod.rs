// Steering side: drive output, proportional control, autocorrection search
// and the turn momentum model.
pub mod actuator;
pub mod controller;
pub mod autocorrect;
pub mod momentum;
