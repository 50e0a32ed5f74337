pub mod rest_attendance_service;

pub use rest_attendance_service::RestAttendanceService;
