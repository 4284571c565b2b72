use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use client_core::{
    config::DEFAULT_SETTINGS_FILE,
    load_settings_from,
    records::{
        AppointmentSearchField, AppointmentSortField, ContactSearchField, ContactSortField,
        InvoiceRow, InvoiceSearchField, InvoiceSortField, PatientSearchField, PatientSortField,
        PrescriptionSearchField, PrescriptionSortField, TransactionSearchField,
        TransactionSortField,
    },
    screens::{
        AppointmentDetailScreen, InvoicesScreen, ListScreen, ListSource, LoadStatus,
        PatientAppointments, PatientBills, PatientContacts, PatientDirectory,
        PatientPrescriptions, PatientTransactions,
    },
    view_state::{SearchScope, SortOrder, ViewRecord, ViewState},
    ActionDispatcher, ApiClient, CheckoutLauncher, ClientEvent, ClientSettings, FetchOrchestrator,
    HospitalBackend, HttpBackend, Notifier, PaymentPollState, Reconcile, StaticToken,
};
use shared::{
    codes::{AppointmentStatus, BillStatus, Gender, Relationship, TransactionStatus},
    domain::{
        Appointment, AppointmentId, BillId, CheckoutLink, ContactDraft, ContactId, EmergencyContact, NoteId,
        PageRequest, PatientId, PatientSummary, Prescription, PrescriptionId, ServiceOrderId,
        Transaction,
    },
};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod render;

use render::Row;

macro_rules! field_flag {
    ($flag:ident => $field:ident { $($variant:ident => $target:ident),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, ValueEnum)]
        enum $flag {
            $($variant),+
        }

        impl From<$flag> for $field {
            fn from(flag: $flag) -> Self {
                match flag {
                    $($flag::$variant => $field::$target),+
                }
            }
        }
    };
}

field_flag!(BillSort => InvoiceSortField { Date => Date, Amount => Amount, Status => Status });
field_flag!(BillSearch => InvoiceSearchField { Id => BillId, Service => ServiceName });
field_flag!(AppointmentSort => AppointmentSortField {
    Date => Date,
    Doctor => Doctor,
    Status => Status,
});
field_flag!(AppointmentSearch => AppointmentSearchField {
    Doctor => DoctorName,
    Id => AppointmentId,
    Symptoms => Symptoms,
});
field_flag!(ContactSort => ContactSortField {
    Name => Name,
    Phone => Phone,
    Relationship => Relationship,
});
field_flag!(ContactSearch => ContactSearchField { Name => Name, Phone => Phone });
field_flag!(PrescriptionSort => PrescriptionSortField { Date => Date, Diagnosis => Diagnosis });
field_flag!(PrescriptionSearch => PrescriptionSearchField {
    Diagnosis => Diagnosis,
    Note => Note,
    Medicine => Medicine,
});
field_flag!(PatientSort => PatientSortField { Name => Name, Id => Id });
field_flag!(PatientSearch => PatientSearchField {
    Name => Name,
    Phone => Phone,
    Email => Email,
    Identity => IdentityNumber,
    Insurance => InsuranceNumber,
});
field_flag!(TransactionSort => TransactionSortField { Date => Date, Amount => Amount });
field_flag!(TransactionSearch => TransactionSearchField { Id => Id, Method => Method });

macro_rules! code_parser {
    ($name:ident, $code:ident, $what:literal) => {
        fn $name(raw: &str) -> Result<$code, String> {
            $code::try_from_code(raw).ok_or_else(|| {
                let known: Vec<&str> = $code::ALL.iter().map(|code| code.as_str()).collect();
                format!("unknown {} '{raw}', expected one of {}", $what, known.join(", "))
            })
        }
    };
}

code_parser!(bill_status, BillStatus, "bill status");
code_parser!(appointment_status, AppointmentStatus, "appointment status");
code_parser!(relationship, Relationship, "relationship");
code_parser!(gender, Gender, "gender");
code_parser!(transaction_status, TransactionStatus, "transaction status");

#[derive(Parser, Debug)]
#[command(name = "clinic", about = "Patient records console for the hospital backend")]
struct Cli {
    /// Settings file. A missing file falls back to defaults and environment.
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

/// Search, sort and paging flags shared by every list.
#[derive(Args, Debug, Clone)]
struct ViewArgs {
    /// Case-insensitive substring to look for.
    #[arg(long)]
    search: Option<String>,
    #[arg(long, conflicts_with = "desc")]
    asc: bool,
    #[arg(long)]
    desc: bool,
    #[arg(long, default_value_t = 1)]
    page: usize,
    /// Rows per page; each list has its own default.
    #[arg(long)]
    page_size: Option<usize>,
}

struct ListFlags<R: ViewRecord> {
    sort: Option<R::SortField>,
    scope: Option<R::SearchField>,
    category: Option<R::Category>,
}

impl ViewArgs {
    fn apply<R: ViewRecord>(&self, view: &mut ViewState<R>, flags: ListFlags<R>) {
        if let Some(term) = &self.search {
            view.set_search_term(term.as_str());
        }
        if let Some(field) = flags.scope {
            view.set_search_scope(SearchScope::Field(field));
        }
        view.set_category(flags.category);
        if let Some(field) = flags.sort {
            view.set_sort_field(field);
        }
        if self.asc {
            view.set_sort_order(SortOrder::Asc);
        } else if self.desc {
            view.set_sort_order(SortOrder::Desc);
        }
        if let Some(page_size) = self.page_size {
            view.set_page_size(page_size);
        }
        view.set_page(self.page);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PayMethod {
    Cash,
    Online,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bills of a patient with their ordered services.
    Bills {
        patient: i64,
        #[arg(long)]
        sort: Option<BillSort>,
        /// Restrict the search to one field.
        #[arg(long = "in")]
        scope: Option<BillSearch>,
        #[arg(long, value_parser = bill_status)]
        status: Option<BillStatus>,
        #[command(flatten)]
        view: ViewArgs,
    },
    Appointments {
        patient: i64,
        #[arg(long)]
        sort: Option<AppointmentSort>,
        #[arg(long = "in")]
        scope: Option<AppointmentSearch>,
        #[arg(long, value_parser = appointment_status)]
        status: Option<AppointmentStatus>,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// One appointment with its service orders, notes and prescription.
    Appointment { id: i64 },
    SetStatus {
        appointment: i64,
        #[arg(value_parser = appointment_status)]
        status: AppointmentStatus,
    },
    DeleteOrder { appointment: i64, order: i64 },
    DeleteNote { appointment: i64, note: i64 },
    Contacts {
        patient: i64,
        #[arg(long)]
        sort: Option<ContactSort>,
        #[arg(long = "in")]
        scope: Option<ContactSearch>,
        #[arg(long, value_parser = relationship)]
        relationship: Option<Relationship>,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Creates a contact, or updates one when `--id` is given.
    SaveContact {
        patient: i64,
        #[arg(long, default_value_t = 0)]
        id: i64,
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: String,
        #[arg(long, value_parser = relationship, default_value = "FAMILY")]
        relationship: Relationship,
    },
    DeleteContact { patient: i64, contact: i64 },
    Prescriptions {
        patient: i64,
        #[arg(long)]
        sort: Option<PrescriptionSort>,
        #[arg(long = "in")]
        scope: Option<PrescriptionSearch>,
        #[command(flatten)]
        view: ViewArgs,
    },
    DeletePrescription { prescription: i64 },
    /// The patient directory, fetched as one large page.
    Patients {
        #[arg(long)]
        sort: Option<PatientSort>,
        #[arg(long = "in")]
        scope: Option<PatientSearch>,
        #[arg(long, value_parser = gender)]
        gender: Option<Gender>,
        #[arg(long, default_value_t = client_core::orchestrator::DIRECTORY_PAGE_SIZE)]
        fetch_size: u32,
        #[command(flatten)]
        view: ViewArgs,
    },
    DeletePatient { patient: i64 },
    Transactions {
        patient: i64,
        #[arg(long)]
        sort: Option<TransactionSort>,
        #[arg(long = "in")]
        scope: Option<TransactionSearch>,
        #[arg(long, value_parser = transaction_status)]
        status: Option<TransactionStatus>,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Pays a bill in cash, or opens its checkout and waits for confirmation.
    Pay {
        patient: i64,
        bill: i64,
        #[arg(long, value_enum, default_value_t = PayMethod::Cash)]
        method: PayMethod,
    },
}

/// Shows the checkout link so the user can open it in a browser.
struct PrintLauncher;

impl CheckoutLauncher for PrintLauncher {
    fn open(&self, link: &CheckoutLink) -> anyhow::Result<()> {
        println!("Liên kết thanh toán: {}", link.checkout_url);
        if let Some(code) = &link.order_code {
            println!("Mã đơn: {code}");
        }
        Ok(())
    }
}

struct Session {
    orchestrator: FetchOrchestrator,
    dispatcher: ActionDispatcher,
    events: broadcast::Receiver<ClientEvent>,
}

impl Session {
    fn connect(settings: &ClientSettings) -> Result<Self> {
        let credentials = Arc::new(StaticToken::new(settings.auth_token.clone()));
        let client =
            ApiClient::new(settings, credentials).context("failed to build the HTTP client")?;
        info!("console: backend root={}", client.root());
        let backend: Arc<dyn HospitalBackend> = Arc::new(HttpBackend::new(client));
        let notifier = Notifier::new();
        let events = notifier.subscribe();
        let dispatcher = ActionDispatcher::new(
            backend.clone(),
            notifier,
            Arc::new(PrintLauncher),
            settings.poll_settings(),
        );
        Ok(Self {
            orchestrator: FetchOrchestrator::new(backend),
            dispatcher,
            events,
        })
    }

    fn flush_events(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(event) => render::event(&event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    }
}

fn ensure_loaded(status: &LoadStatus) -> Result<()> {
    match status {
        LoadStatus::Failed(message) => bail!("{message}"),
        _ => Ok(()),
    }
}

async fn show_list<S>(
    session: &Session,
    source: S,
    view: &ViewArgs,
    flags: ListFlags<S::Record>,
) -> Result<()>
where
    S: ListSource,
    S::Record: Row,
{
    let mut screen = ListScreen::new(source, session.orchestrator.clone());
    ensure_loaded(screen.reload().await)?;
    view.apply(screen.view_mut(), flags);
    render::slice(&screen.slice());
    Ok(())
}

async fn load_detail(session: &Session, id: i64) -> Result<AppointmentDetailScreen> {
    let mut screen = AppointmentDetailScreen::new(
        AppointmentId(id),
        session.orchestrator.clone(),
        session.dispatcher.clone(),
    );
    ensure_loaded(screen.reload().await)?;
    Ok(screen)
}

fn print_detail(screen: &AppointmentDetailScreen) {
    if let Some(detail) = screen.detail() {
        render::appointment_detail(detail);
    }
}

async fn pay(session: &mut Session, patient: i64, bill: i64, method: PayMethod) -> Result<()> {
    let mut screen = InvoicesScreen::new(
        PatientId(patient),
        session.orchestrator.clone(),
        session.dispatcher.clone(),
    );
    ensure_loaded(screen.reload().await)?;

    match method {
        PayMethod::Cash => screen.pay_cash(BillId(bill)).await?,
        PayMethod::Online => {
            screen.pay_online(BillId(bill)).await?;
            session.flush_events();
            eprintln!("Đang chờ xác nhận thanh toán (Ctrl+C để hủy)...");
            let finished = tokio::select! {
                state = screen.wait_for_payment() => state,
                _ = tokio::signal::ctrl_c() => None,
            };
            let state = match finished {
                Some(state) => state,
                None => {
                    screen.cancel_payment();
                    PaymentPollState::Cancelled
                }
            };
            session.flush_events();
            match state {
                PaymentPollState::Confirmed { .. } => {}
                PaymentPollState::TimedOut => {
                    bail!("Chưa nhận được xác nhận thanh toán cho hóa đơn #{bill}")
                }
                _ => return Ok(()),
            }
        }
    }

    render::slice(&screen.list().slice());
    Ok(())
}

async fn run(command: Command, session: &mut Session) -> Result<()> {
    match command {
        Command::Bills {
            patient,
            sort,
            scope,
            status,
            view,
        } => {
            let flags = ListFlags::<InvoiceRow> {
                sort: sort.map(Into::into),
                scope: scope.map(Into::into),
                category: status,
            };
            show_list(session, PatientBills(PatientId(patient)), &view, flags).await
        }
        Command::Appointments {
            patient,
            sort,
            scope,
            status,
            view,
        } => {
            let flags = ListFlags::<Appointment> {
                sort: sort.map(Into::into),
                scope: scope.map(Into::into),
                category: status,
            };
            show_list(session, PatientAppointments(PatientId(patient)), &view, flags).await
        }
        Command::Appointment { id } => {
            print_detail(&load_detail(session, id).await?);
            Ok(())
        }
        Command::SetStatus {
            appointment,
            status,
        } => {
            let mut screen = load_detail(session, appointment).await?;
            screen.change_status(status).await?;
            print_detail(&screen);
            Ok(())
        }
        Command::DeleteOrder { appointment, order } => {
            let mut screen = load_detail(session, appointment).await?;
            screen.delete_service_order(ServiceOrderId(order)).await?;
            print_detail(&screen);
            Ok(())
        }
        Command::DeleteNote { appointment, note } => {
            let mut screen = load_detail(session, appointment).await?;
            screen.delete_note(NoteId(note)).await?;
            print_detail(&screen);
            Ok(())
        }
        Command::Contacts {
            patient,
            sort,
            scope,
            relationship,
            view,
        } => {
            let flags = ListFlags::<EmergencyContact> {
                sort: sort.map(Into::into),
                scope: scope.map(Into::into),
                category: relationship,
            };
            show_list(session, PatientContacts(PatientId(patient)), &view, flags).await
        }
        Command::SaveContact {
            patient,
            id,
            name,
            phone,
            relationship,
        } => {
            let draft = ContactDraft {
                contact_name: name,
                contact_phone: phone,
                relationship,
            };
            let reconcile = session
                .dispatcher
                .save_contact(PatientId(patient), ContactId(id), &draft)
                .await?;
            if let Reconcile::Upsert(contact) = reconcile {
                println!("{}", EmergencyContact::HEADER);
                println!("{}", contact.row());
            }
            Ok(())
        }
        Command::DeleteContact { patient, contact } => {
            let mut screen =
                ListScreen::new(PatientContacts(PatientId(patient)), session.orchestrator.clone());
            ensure_loaded(screen.reload().await)?;
            let reconcile = session
                .dispatcher
                .delete_contact(PatientId(patient), ContactId(contact))
                .await?;
            screen.apply(reconcile).await;
            render::slice(&screen.slice());
            Ok(())
        }
        Command::Prescriptions {
            patient,
            sort,
            scope,
            view,
        } => {
            let flags = ListFlags::<Prescription> {
                sort: sort.map(Into::into),
                scope: scope.map(Into::into),
                category: None,
            };
            show_list(session, PatientPrescriptions(PatientId(patient)), &view, flags).await
        }
        Command::DeletePrescription { prescription } => {
            session
                .dispatcher
                .delete_prescription(PrescriptionId(prescription))
                .await?;
            Ok(())
        }
        Command::Patients {
            sort,
            scope,
            gender,
            fetch_size,
            view,
        } => {
            let flags = ListFlags::<PatientSummary> {
                sort: sort.map(Into::into),
                scope: scope.map(Into::into),
                category: gender,
            };
            let source = PatientDirectory {
                request: PageRequest::first(fetch_size),
            };
            show_list(session, source, &view, flags).await
        }
        Command::DeletePatient { patient } => {
            session.dispatcher.delete_patient(PatientId(patient)).await?;
            Ok(())
        }
        Command::Transactions {
            patient,
            sort,
            scope,
            status,
            view,
        } => {
            let flags = ListFlags::<Transaction> {
                sort: sort.map(Into::into),
                scope: scope.map(Into::into),
                category: status,
            };
            show_list(session, PatientTransactions(PatientId(patient)), &view, flags).await
        }
        Command::Pay {
            patient,
            bill,
            method,
        } => pay(session, patient, bill, method).await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = load_settings_from(&cli.config)?;
    let mut session = Session::connect(&settings)?;

    let outcome = run(cli.command, &mut session).await;
    session.flush_events();
    outcome
}
