pub mod event_table;
pub mod frame_viewer;
pub mod mapping_dialog;
pub mod style_dialog;
pub mod theme;
pub mod toolbar;
pub mod trace_view;
