//! Property registries of the machine object model.
//!
//! Only the parts of the model this server deals with are declared here.
//! Properties maintained by the control server itself (as opposed to the
//! firmware) are marked restricted.

use crate::model::{ModelList, ModelNode, Structured};
use crate::schema::{ElementKind, PropertyDef, Schema};

pub static AXIS: Schema = Schema {
    name: "Axis",
    properties: &[
        PropertyDef::scalar("letter"),
        PropertyDef::scalar("homed"),
        PropertyDef::scalar("machinePosition"),
        PropertyDef::scalar("userPosition"),
        PropertyDef::scalar("babystep"),
        PropertyDef::scalar("min"),
        PropertyDef::scalar("max"),
        PropertyDef::list("drivers", ElementKind::Scalar),
        PropertyDef::list("workplaceOffsets", ElementKind::Scalar),
    ],
};

pub static EXTRUDER: Schema = Schema {
    name: "Extruder",
    properties: &[
        PropertyDef::scalar("driver"),
        PropertyDef::scalar("filament"),
        PropertyDef::scalar("position"),
        PropertyDef::scalar("rawPosition"),
        PropertyDef::scalar("factor"),
    ],
};

pub static MOVE: Schema = Schema {
    name: "Move",
    properties: &[
        PropertyDef::list("axes", ElementKind::Structured(&AXIS)),
        PropertyDef::list("extruders", ElementKind::Structured(&EXTRUDER)),
        PropertyDef::scalar("currentMove"),
        PropertyDef::scalar("speedFactor"),
        PropertyDef::scalar("workplaceNumber"),
    ],
};

pub static HEATER: Schema = Schema {
    name: "Heater",
    properties: &[
        PropertyDef::scalar("active"),
        PropertyDef::scalar("current"),
        PropertyDef::scalar("standby"),
        PropertyDef::scalar("state"),
        PropertyDef::scalar("sensor"),
    ],
};

pub static HEAT: Schema = Schema {
    name: "Heat",
    properties: &[
        PropertyDef::list("bedHeaters", ElementKind::Scalar),
        PropertyDef::list("chamberHeaters", ElementKind::Scalar),
        PropertyDef::list("heaters", ElementKind::Structured(&HEATER)),
    ],
};

pub static JOB_FILE: Schema = Schema {
    name: "GCodeFileInfo",
    properties: &[
        PropertyDef::scalar("fileName"),
        PropertyDef::scalar("size"),
        PropertyDef::scalar("height"),
        PropertyDef::list("filament", ElementKind::Scalar),
        PropertyDef::blob("thumbnails"),
    ],
};

pub static JOB: Schema = Schema {
    name: "Job",
    properties: &[
        PropertyDef::structured("file", &JOB_FILE),
        PropertyDef::scalar("filePosition"),
        PropertyDef::scalar("lastFileName"),
        PropertyDef::scalar("lastFileAborted"),
        PropertyDef::scalar("layer"),
        PropertyDef::list("layers", ElementKind::List),
    ],
};

pub static MESSAGE: Schema = Schema {
    name: "Message",
    properties: &[
        PropertyDef::scalar("content"),
        PropertyDef::scalar("time"),
        PropertyDef::scalar("type"),
    ],
};

pub static STATE: Schema = Schema {
    name: "State",
    properties: &[
        PropertyDef::scalar("status"),
        PropertyDef::scalar("displayMessage"),
        PropertyDef::blob("messageBox"),
        PropertyDef::map("gcodeBuffer"),
        PropertyDef::scalar("upTime"),
        PropertyDef::scalar("dsfVersion").restricted(),
        PropertyDef::scalar("dsfPluginSupport").restricted(),
    ],
};

pub static BOARD: Schema = Schema {
    name: "Board",
    properties: &[
        PropertyDef::scalar("name"),
        PropertyDef::scalar("firmwareVersion"),
        PropertyDef::scalar("canAddress"),
        PropertyDef::scalar("mcuTemp"),
    ],
};

pub static CPU: Schema = Schema {
    name: "CPU",
    properties: &[
        PropertyDef::scalar("hardware"),
        PropertyDef::scalar("avgLoad"),
        PropertyDef::scalar("temperature"),
    ],
};

pub static SBC: Schema = Schema {
    name: "SBC",
    properties: &[
        PropertyDef::scalar("distribution"),
        PropertyDef::scalar("model"),
        PropertyDef::structured("cpu", &CPU),
        PropertyDef::scalar("uptime"),
    ],
};

pub static TOOL: Schema = Schema {
    name: "Tool",
    properties: &[
        PropertyDef::scalar("number"),
        PropertyDef::scalar("name"),
        PropertyDef::list("heaters", ElementKind::Scalar),
        PropertyDef::list("extruders", ElementKind::Scalar),
        PropertyDef::list("offsets", ElementKind::Scalar),
    ],
};

pub static OBJECT_MODEL: Schema = Schema {
    name: "ObjectModel",
    properties: &[
        PropertyDef::list("boards", ElementKind::Structured(&BOARD)),
        PropertyDef::map("global"),
        PropertyDef::structured("heat", &HEAT),
        PropertyDef::structured("job", &JOB),
        PropertyDef::list("messages", ElementKind::Structured(&MESSAGE)),
        PropertyDef::structured("move", &MOVE),
        PropertyDef::map("plugins").restricted(),
        PropertyDef::structured("sbc", &SBC).restricted(),
        PropertyDef::structured("state", &STATE),
        PropertyDef::list("tools", ElementKind::Structured(&TOOL)),
    ],
};

/// Create an empty machine object model.
pub fn object_model() -> ModelNode {
    Structured::new(&OBJECT_MODEL).into()
}

/// Build a list of default structured items.
pub fn structured_list(schema: &'static Schema, count: usize) -> ModelList {
    let items = (0..count)
        .map(|_| ModelNode::from(Structured::new(schema)))
        .collect();
    ModelList::with_items(ElementKind::Structured(schema), items)
}
