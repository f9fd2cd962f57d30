mod experience;
mod helpers;
mod journal;
mod log;
mod recipe;
mod reminder;
mod stats;
mod substance;
mod unit;

pub(crate) use experience::{
    cmd_experience_delete, cmd_experience_edit, cmd_experience_favorite, cmd_experience_list,
    cmd_experience_new, cmd_experience_show, cmd_ingestion_delete, cmd_ingestion_edit,
    cmd_note_add, cmd_note_delete, cmd_note_edit, cmd_note_photo, cmd_photo_delete,
};
pub(crate) use helpers::parse_date;
pub(crate) use journal::{cmd_export, cmd_import};
pub(crate) use log::{LogOptions, cmd_log};
pub(crate) use recipe::{
    cmd_recipe_add, cmd_recipe_archive, cmd_recipe_create, cmd_recipe_delete, cmd_recipe_list,
    cmd_recipe_remove, cmd_recipe_show,
};
pub(crate) use reminder::{
    ReminderOptions, cmd_reminder_add, cmd_reminder_delete, cmd_reminder_enable,
    cmd_reminder_fire, cmd_reminder_list, cmd_reminder_watch,
};
pub(crate) use stats::cmd_stats;
pub(crate) use substance::{
    cmd_categories, cmd_companion_color, cmd_companion_list, cmd_search, cmd_substance_add,
    cmd_substance_delete, cmd_substance_export, cmd_substance_import, cmd_substance_list,
    cmd_substance_show,
};
pub(crate) use unit::{UnitOptions, cmd_unit_add, cmd_unit_archive, cmd_unit_delete, cmd_unit_list};
