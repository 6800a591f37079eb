/// The class of feature a detector is asked to find.
///
/// Backends support a subset of classes; asking for an unsupported class
/// yields an empty detection set rather than an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FeatureClass {
    Body,
    Face,
    Eye,
    Mouth,
}

impl FeatureClass {
    pub fn name(&self) -> &'static str {
        match self {
            FeatureClass::Body => "body",
            FeatureClass::Face => "face",
            FeatureClass::Eye => "eye",
            FeatureClass::Mouth => "mouth",
        }
    }
}

impl std::str::FromStr for FeatureClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "body" => Ok(FeatureClass::Body),
            "face" => Ok(FeatureClass::Face),
            "eye" => Ok(FeatureClass::Eye),
            "mouth" => Ok(FeatureClass::Mouth),
            other => Err(format!("unknown feature class: {other}")),
        }
    }
}
