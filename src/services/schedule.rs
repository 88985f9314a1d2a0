// src/services/schedule.rs

use std::sync::Arc;

use chrono::NaiveDate;

use crate::{
    config::Settings,
    models::{followup::FollowUpRecord, MaintenanceSummary, TaskRecord},
    services::dates::{parse_follow_field, shift_date, to_iso},
};

/// Deriva o cronograma de manutenção (última, anterior e próxima visita) a
/// partir do histórico de acompanhamentos e das tarefas agendadas.
///
/// `today` é sempre parâmetro explícito: os handlers passam a data local e
/// os testes fixam uma data conhecida.
#[derive(Clone)]
pub struct ScheduleService {
    settings: Arc<Settings>,
}

impl ScheduleService {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }

    pub fn summarize(
        &self,
        customer_code: &str,
        records: &[FollowUpRecord],
        tasks: &[TaskRecord],
        today: NaiveDate,
    ) -> MaintenanceSummary {
        let offset_days = self.settings.maintenance_next_date_offset_days;
        let owner_keyword = self.settings.maintenance_task_owner_keyword.as_deref();

        // Só o histórico da equipe de manutenção conta para o cronograma.
        let mut parsed: Vec<(&FollowUpRecord, NaiveDate)> = records
            .iter()
            .filter(|record| {
                record
                    .owner_name()
                    .contains(&self.settings.maintenance_marker)
            })
            .filter_map(|record| {
                parse_follow_field(record.follow_time()).map(|date| (record, date))
            })
            .collect();

        if parsed.is_empty() {
            // Sem histórico utilizável: só a inferência por tarefa sobrevive.
            let next = self
                .upcoming_task_date(tasks, owner_keyword, today)
                .map(|date| apply_offset(date, offset_days));
            return MaintenanceSummary {
                customer_code: customer_code.to_string(),
                customer_name: None,
                latest_service_date: None,
                previous_service_date: None,
                next_service_date: next.map(to_iso),
            };
        }

        parsed.sort_by(|a, b| b.1.cmp(&a.1));

        // "Última" é a mais recente que já aconteceu; datas futuras são
        // agenda, não histórico. Se todas forem futuras, fica a primeira.
        let latest_index = parsed
            .iter()
            .position(|(_, date)| *date <= today)
            .unwrap_or(0);
        let (latest_record, latest_date) = parsed[latest_index];
        let previous_date = parsed.get(latest_index + 1).map(|(_, date)| *date);

        let task_date =
            self.select_task_base_date(tasks, owner_keyword, latest_date, today);

        let next_base = task_date.or(previous_date).unwrap_or(latest_date);

        let customer_name = latest_record
            .customer_name()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        MaintenanceSummary {
            customer_code: customer_code.to_string(),
            customer_name,
            latest_service_date: Some(to_iso(latest_date)),
            previous_service_date: previous_date.map(to_iso),
            next_service_date: Some(to_iso(apply_offset(next_base, offset_days))),
        }
    }

    /// Data-base vinda das tarefas, em prioridade estrita:
    ///   a. tarefa do responsável-chave com data depois de hoje (a mais cedo);
    ///   b. qualquer tarefa com data depois de hoje (a mais cedo);
    ///   c. tarefa do responsável-chave depois da última visita (a mais cedo);
    ///   d. qualquer tarefa depois da última visita (a mais cedo);
    ///   e. tarefa do responsável-chave até a última visita (a mais recente);
    ///   f. qualquer tarefa até a última visita (a mais recente).
    fn select_task_base_date(
        &self,
        tasks: &[TaskRecord],
        owner_keyword: Option<&str>,
        latest_date: NaiveDate,
        today: NaiveDate,
    ) -> Option<NaiveDate> {
        if tasks.is_empty() {
            return None;
        }

        let mut owner_future_today: Vec<NaiveDate> = Vec::new();
        let mut owner_future_latest: Vec<NaiveDate> = Vec::new();
        let mut owner_past: Vec<NaiveDate> = Vec::new();
        let mut general_future_today: Vec<NaiveDate> = Vec::new();
        let mut general_future_latest: Vec<NaiveDate> = Vec::new();
        let mut general_past: Vec<NaiveDate> = Vec::new();

        for task in tasks {
            let Some(date) = task_date(task) else {
                continue;
            };
            let is_owner = owner_keyword
                .is_some_and(|keyword| task.owner_name().contains(keyword));

            let (future_today, future_latest, past) = if is_owner {
                (
                    &mut owner_future_today,
                    &mut owner_future_latest,
                    &mut owner_past,
                )
            } else {
                (
                    &mut general_future_today,
                    &mut general_future_latest,
                    &mut general_past,
                )
            };

            if date > today {
                future_today.push(date);
            } else if date > latest_date {
                future_latest.push(date);
            } else {
                past.push(date);
            }
        }

        owner_future_today
            .into_iter()
            .min()
            .or_else(|| general_future_today.into_iter().min())
            .or_else(|| owner_future_latest.into_iter().min())
            .or_else(|| general_future_latest.into_iter().min())
            .or_else(|| owner_past.into_iter().max())
            .or_else(|| general_past.into_iter().max())
    }

    /// Próxima tarefa estritamente futura, com preferência pelo
    /// responsável-chave e limitada pela janela máxima configurada.
    fn upcoming_task_date(
        &self,
        tasks: &[TaskRecord],
        owner_keyword: Option<&str>,
        today: NaiveDate,
    ) -> Option<NaiveDate> {
        let max_gap = self.settings.maintenance_task_max_gap_days;

        let mut owner_dates: Vec<NaiveDate> = Vec::new();
        let mut general_dates: Vec<NaiveDate> = Vec::new();

        for task in tasks {
            let Some(date) = task_date(task) else {
                continue;
            };
            if date <= today {
                continue;
            }
            if let Some(gap) = max_gap {
                if (date - today).num_days() > gap {
                    continue;
                }
            }
            if owner_keyword.is_some_and(|keyword| task.owner_name().contains(keyword)) {
                owner_dates.push(date);
            } else {
                general_dates.push(date);
            }
        }

        owner_dates
            .into_iter()
            .min()
            .or_else(|| general_dates.into_iter().min())
    }
}

fn apply_offset(date: NaiveDate, offset_days: i64) -> NaiveDate {
    if offset_days == 0 {
        date
    } else {
        shift_date(date, offset_days)
    }
}

/// Data de uma tarefa: início, senão planejada, senão fim.
fn task_date(task: &TaskRecord) -> Option<NaiveDate> {
    parse_follow_field(task.start_date())
        .or_else(|| parse_follow_field(task.plan_date()))
        .or_else(|| parse_follow_field(task.end_date()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn service() -> ScheduleService {
        ScheduleService::new(Arc::new(Settings::test_defaults()))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("data de teste válida")
    }

    fn followup(follow_time: &str, name: &str) -> FollowUpRecord {
        FollowUpRecord(json!({
            "ower_name": "維修幫阿明",
            "customer_name": name,
            "followTime": follow_time,
        }))
    }

    fn task(owner: &str, start: &str) -> Value {
        json!({"ower_name": owner, "startDate": start})
    }

    #[test]
    fn ultima_e_anterior_ignorando_datas_futuras() {
        let today = date(2024, 6, 1);
        let records = vec![
            followup("2024-03-01", "Loja"),
            followup("2024-07-01", "Loja"),
            followup("2024-05-01", "Loja"),
        ];

        let summary = service().summarize("C3770", &records, &[], today);

        // 2024-07-01 é agenda, não histórico.
        assert_eq!(summary.latest_service_date.as_deref(), Some("2024-05-01"));
        assert_eq!(summary.previous_service_date.as_deref(), Some("2024-03-01"));
        // Sem tarefa, a próxima cai para a anterior.
        assert_eq!(summary.next_service_date.as_deref(), Some("2024-03-01"));
        assert_eq!(summary.customer_name.as_deref(), Some("Loja"));
    }

    #[test]
    fn todas_futuras_mantem_a_primeira_como_ultima() {
        let today = date(2024, 6, 1);
        let records = vec![followup("2024-08-01", "Loja"), followup("2024-07-01", "Loja")];

        let summary = service().summarize("C3770", &records, &[], today);

        assert_eq!(summary.latest_service_date.as_deref(), Some("2024-08-01"));
        assert_eq!(summary.previous_service_date.as_deref(), Some("2024-07-01"));
    }

    #[test]
    fn tarefa_do_responsavel_chave_vence_a_geral() {
        // Tarefa do responsável amanhã x tarefa geral semana que vem:
        // o balde (a) vence o (b).
        let today = date(2024, 6, 1);
        let records = vec![followup("2024-05-01", "Loja")];
        let tasks: Vec<TaskRecord> = vec![
            TaskRecord(task("銷售部小陳", "2024-06-08")),
            TaskRecord(task("維修幫阿明", "2024-06-02")),
        ];

        let summary = service().summarize("C3770", &records, &tasks, today);
        assert_eq!(summary.next_service_date.as_deref(), Some("2024-06-02"));
    }

    #[test]
    fn sem_responsavel_chave_vale_a_geral_mais_cedo() {
        let today = date(2024, 6, 1);
        let records = vec![followup("2024-05-01", "Loja")];
        let tasks: Vec<TaskRecord> = vec![
            TaskRecord(task("銷售部小陳", "2024-06-20")),
            TaskRecord(task("銷售部小李", "2024-06-10")),
        ];

        let summary = service().summarize("C3770", &records, &tasks, today);
        assert_eq!(summary.next_service_date.as_deref(), Some("2024-06-10"));
    }

    #[test]
    fn tarefa_entre_ultima_visita_e_hoje_vem_depois_das_futuras() {
        let today = date(2024, 6, 1);
        let records = vec![followup("2024-05-01", "Loja")];
        // Nenhuma futura; uma tarefa caiu entre a última visita e hoje.
        let tasks: Vec<TaskRecord> = vec![TaskRecord(task("銷售部小陳", "2024-05-15"))];

        let summary = service().summarize("C3770", &records, &tasks, today);
        assert_eq!(summary.next_service_date.as_deref(), Some("2024-05-15"));
    }

    #[test]
    fn tarefas_antigas_usam_a_mais_recente() {
        let today = date(2024, 6, 1);
        let records = vec![followup("2024-05-01", "Loja")];
        let tasks: Vec<TaskRecord> = vec![
            TaskRecord(task("維修幫阿明", "2024-03-01")),
            TaskRecord(task("維修幫阿明", "2024-04-01")),
        ];

        let summary = service().summarize("C3770", &records, &tasks, today);
        assert_eq!(summary.next_service_date.as_deref(), Some("2024-04-01"));
    }

    #[test]
    fn tarefa_sem_nenhuma_data_eh_ignorada() {
        let today = date(2024, 6, 1);
        let records = vec![followup("2024-05-01", "Loja")];
        let tasks: Vec<TaskRecord> = vec![
            TaskRecord(json!({"ower_name": "維修幫", "subject": "ligar"})),
            TaskRecord(json!({"ower_name": "維修幫", "planDate": "2024-06-03"})),
        ];

        let summary = service().summarize("C3770", &records, &tasks, today);
        // planDate entra como fallback de startDate.
        assert_eq!(summary.next_service_date.as_deref(), Some("2024-06-03"));
    }

    #[test]
    fn sem_historico_usa_so_a_proxima_tarefa() {
        let today = date(2024, 6, 1);
        let tasks: Vec<TaskRecord> = vec![
            TaskRecord(task("維修幫阿明", "2024-06-10")),
            TaskRecord(task("銷售部小陳", "2024-06-05")),
        ];

        let summary = service().summarize("C3770", &[], &tasks, today);

        assert_eq!(summary.latest_service_date, None);
        assert_eq!(summary.previous_service_date, None);
        assert_eq!(summary.customer_name, None);
        // Preferência pelo responsável-chave mesmo não sendo a mais cedo.
        assert_eq!(summary.next_service_date.as_deref(), Some("2024-06-10"));
    }

    #[test]
    fn janela_maxima_limita_a_inferencia_por_tarefa() {
        let mut settings = Settings::test_defaults();
        settings.maintenance_task_max_gap_days = Some(30);
        let service = ScheduleService::new(Arc::new(settings));

        let today = date(2024, 6, 1);
        let tasks: Vec<TaskRecord> = vec![TaskRecord(task("維修幫阿明", "2024-09-01"))];

        let summary = service.summarize("C3770", &[], &tasks, today);
        assert_eq!(summary.next_service_date, None);
    }

    #[test]
    fn offset_desloca_a_proxima_data_final() {
        let mut settings = Settings::test_defaults();
        settings.maintenance_next_date_offset_days = 14;
        let service = ScheduleService::new(Arc::new(settings));

        let today = date(2024, 6, 1);
        let records = vec![followup("2024-05-01", "Loja")];
        let tasks: Vec<TaskRecord> = vec![TaskRecord(task("維修幫阿明", "2024-06-02"))];

        let summary = service.summarize("C3770", &records, &tasks, today);

        assert_eq!(summary.next_service_date.as_deref(), Some("2024-06-16"));
        // As datas históricas não são deslocadas.
        assert_eq!(summary.latest_service_date.as_deref(), Some("2024-05-01"));
    }

    #[test]
    fn registro_de_outra_equipe_nao_conta_no_historico() {
        let today = date(2024, 6, 1);
        let records = vec![
            FollowUpRecord(json!({
                "ower_name": "銷售部小陳",
                "followTime": "2024-05-20",
            })),
            followup("2024-04-01", "Loja"),
        ];

        let summary = service().summarize("C3770", &records, &[], today);
        assert_eq!(summary.latest_service_date.as_deref(), Some("2024-04-01"));
    }
}
