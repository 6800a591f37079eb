pub mod detection_set;
pub mod feature_class;
pub mod region_detector;
