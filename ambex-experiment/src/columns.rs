//! Column layouts of the two per-participant CSV files.
//!
//! Analysis scripts key on these exact names; changing one is a breaking
//! change for every dataset recorded so far.

/// One row per confirmed selection.
pub const SELECTION_COLUMNS: [&str; 18] = [
    // ids
    "ParticipantID",
    "SelectionID",
    // conditions
    "Context",
    "CircleDirection", // empty outside the circle context
    "ReferenceFrame",
    "TargetSize",
    "DominantHand",
    // time
    "HumanReadableTimestampUTC",
    "SystemClockTimestampMs", // ms since the first selection of the block
    // selection
    "ActiveTargetIndex",
    "AbsoluteTargetPositionX",
    "AbsoluteTargetPositionY",
    "AbsoluteSelectionPositionX",
    "AbsoluteSelectionPositionY",
    "LocalSelectionPositionX",
    "LocalSelectionPositionY",
    "Success",
    "SelectionDuration",
];

/// Tracked objects in the high-frequency log, one pose block each.
pub const TRANSFORM_PREFIXES: [&str; 9] = [
    "Track",
    "WalkingDirection",
    "Head",
    "NeckBase",
    "DominantPalmCenter",
    "DominantIndexTip",
    "WeakPalmCenter",
    "AllTargets",
    "ActiveTarget",
];

/// Per-object pose columns, appended to each prefix.
pub const TRANSFORM_SUFFIXES: [&str; 13] = [
    "PositionX",
    "PositionY",
    "PositionZ",
    "ForwardX",
    "ForwardY",
    "ForwardZ",
    "UpX",
    "UpY",
    "UpZ",
    "QuaternionX",
    "QuaternionY",
    "QuaternionZ",
    "QuaternionW",
];

/// One row per rendered frame while targets are shown during a trial.
pub fn high_frequency_columns() -> Vec<String> {
    let head = [
        // ids
        "ParticipantID",
        "MeasurementID",
        // conditions
        "Context",
        "CircleDirection",
        "ReferenceFrame",
        "TargetSize",
        "DominantHand",
        // time
        "HumanReadableTimestampUTC",
        "SystemClockTimestampMs", // ms since the first target of the block lit up
    ];
    let tail = [
        "SelectorProjectionOntoAllTargetsX",
        "SelectorProjectionOntoAllTargetsY",
        "ActiveTargetIndex",
        "ActiveTargetInsideAllTargetsX",
        "ActiveTargetInsideAllTargetsY",
        "IsSelectorInsideCollider",
        "DistanceFromSelectorToAllTargetsOXYPlane", // negative while the selector is inside the collider
    ];

    let mut columns: Vec<String> = head.iter().map(|c| c.to_string()).collect();
    for prefix in TRANSFORM_PREFIXES {
        for suffix in TRANSFORM_SUFFIXES {
            columns.push(format!("{prefix}{suffix}"));
        }
    }
    columns.extend(tail.iter().map(|c| c.to_string()));
    columns
}
