//! The financial write that backs a priced appointment.

use crate::appointment::Appointment;
use crate::error::Result;
use crate::patient::{FinancialTransaction, Patient, PaymentStatus};
use crate::Error;
use chrono::{DateTime, Utc};

/// Secondary write performed after an appointment with a price is saved.
///
/// Implementations return the patient with the transaction in place. The
/// store swaps that record in; a failure leaves the patient untouched.
pub trait Ledger: Send + Sync {
    fn post(&self, patient: &Patient, appointment: &Appointment, at: DateTime<Utc>)
        -> Result<Patient>;

    /// Drop the transaction linked to `appointment_id`, for an appointment
    /// that is no longer billable. `None` when nothing is linked.
    fn void(&self, patient: &Patient, appointment_id: &str) -> Result<Option<Patient>> {
        if patient.transaction_for(appointment_id).is_none() {
            return Ok(None);
        }
        let mut updated = patient.clone();
        updated
            .financial
            .retain(|t| t.appointment_id.as_deref() != Some(appointment_id));
        Ok(Some(updated))
    }
}

/// Keeps one transaction per appointment on the patient's account.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatientLedger;

impl Ledger for PatientLedger {
    fn post(
        &self,
        patient: &Patient,
        appointment: &Appointment,
        _at: DateTime<Utc>,
    ) -> Result<Patient> {
        let amount = appointment
            .billable_amount()
            .ok_or_else(|| Error::Ledger("appointment has no billable amount".into()))?;
        if patient.id != appointment.patient_id {
            return Err(Error::Ledger(format!(
                "appointment {} does not belong to patient {}",
                appointment.id, patient.id
            )));
        }

        let status = appointment.payment_status.unwrap_or(PaymentStatus::Pending);
        let description = format!("Appointment on {}", appointment.start.format("%Y-%m-%d %H:%M"));

        let mut updated = patient.clone();
        match updated
            .financial
            .iter()
            .position(|t| t.appointment_id.as_deref() == Some(appointment.id.as_str()))
        {
            Some(index) => {
                let previous = &updated.financial[index];
                updated.financial[index] = FinancialTransaction {
                    id: previous.id.clone(),
                    amount,
                    status,
                    method: appointment.payment_method,
                    description,
                    date: appointment.start,
                    appointment_id: Some(appointment.id.clone()),
                };
            }
            None => updated.financial.push(FinancialTransaction {
                id: uuid::Uuid::new_v4().to_string(),
                amount,
                status,
                method: appointment.payment_method,
                description,
                date: appointment.start,
                appointment_id: Some(appointment.id.clone()),
            }),
        }
        Ok(updated)
    }
}
