pub const MEASUREMENT_TEMPERATURE_F: &str = "TemperatureF";
pub const MEASUREMENT_SET_POINT_F: &str = "SetPointF";
pub const MEASUREMENT_EQUIPMENT_STATUS: &str = "EquipmentStatus";

pub const TAG_LOCATION: &str = "location";
pub const TAG_OPERATION: &str = "operation";
pub const TAG_EQUIPMENT: &str = "equipment";

pub const LOCATION_THERMOSTAT: &str = "thermostat";
pub const OPERATION_HEAT: &str = "heat";
pub const EQUIPMENT_FURNACE: &str = "furnace";
