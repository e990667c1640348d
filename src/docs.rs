use crate::api::attendance::{GroupQuery, RangeQuery, SchoolYearQuery};
use crate::model::attendance::{AttendanceRecord, AttendanceStatus};
use crate::model::holiday::Holiday;
use crate::reader::ingest::Identification;
use crate::service::attendance::{Correction, StatusCount};
use crate::service::reconciler::{AbsenceReport, CloseReport, ReconcileReport, SkipReason};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Fichajes API",
        version = "0.1.0",
        description = r#"
## School attendance from proximity cards

Students tap their card on the classroom reader. The first tap of the day
registers the entry, the next one the exit.

### Statuses
- **FALTA**: no entry that day
- **PRESENTE**: entry registered, exit still pending
- **SIN SALIDA**: never badged out before 23:00
- **COMPLETA**: entry and exit registered
- **FESTIVO**: school holiday

A daily job closes records left open and back-fills absences for every
active enrollment, skipping weekends and vacation days.
"#,
    ),
    paths(
        crate::api::attendance::register_entry,
        crate::api::attendance::register_exit,
        crate::api::attendance::get_record,
        crate::api::attendance::correct_record,
        crate::api::attendance::records_on_date,
        crate::api::attendance::records_in_range,
        crate::api::attendance::status_counts,
        crate::api::attendance::records_for_school_year,
        crate::api::attendance::records_for_group,
        crate::api::attendance::all_records,

        crate::api::reader::last_uid,
        crate::api::reconciliation::run_reconciliation,
        crate::api::holidays::list_holidays
    ),
    components(
        schemas(
            AttendanceRecord,
            AttendanceStatus,
            Correction,
            StatusCount,
            RangeQuery,
            SchoolYearQuery,
            GroupQuery,
            Identification,
            ReconcileReport,
            CloseReport,
            AbsenceReport,
            SkipReason,
            Holiday
        )
    ),
    tags(
        (name = "Attendance", description = "Entry/exit registration and attendance queries"),
        (name = "Reader", description = "Card reader status"),
        (name = "Reconciliation", description = "Daily close-out and absence back-fill"),
        (name = "Holidays", description = "School holiday calendar"),
    )
)]
pub struct ApiDoc;
