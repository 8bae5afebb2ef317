//! Prompt templates for the two model passes of each document kind.
//!
//! Stage one asks for a free-text excerpt of the relevant sentences, stage
//! two turns that excerpt into JSON with a fixed set of keys.

/// A prompt with a single `{input}` placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
    pub name: &'static str,
    template: &'static str,
}

const PLACEHOLDER: &str = "{input}";

impl PromptTemplate {
    pub const fn new(name: &'static str, template: &'static str) -> Self {
        Self { name, template }
    }

    pub fn render(&self, input: &str) -> String {
        self.template.replacen(PLACEHOLDER, input, 1)
    }
}

pub const DECISION_EXTRACT: PromptTemplate = PromptTemplate::new(
    "decision_extract",
    r#"Знайди у тексті резолютивну частину судового рішення.

Зверни увагу на текст після слів "УХВАЛИВ", "ВИРІШИВ" або "ПОСТАНОВИВ".
Поверни 10-20 речень резолютивної частини разом із фразами про суми
(стягнення, судовий збір, правнича допомога).

Документ:
{input}

Резолютивна частина:"#,
);

pub const DECISION_CLASSIFY: PromptTemplate = PromptTemplate::new(
    "decision_classify",
    r#"За резолютивною частиною визнач:
1) статус рішення для позивача;
2) основну суму стягнення;
3) судовий збір;
4) витрати на правничу допомогу;
5) дату ухвалення рішення (зазвичай на початку документа).

Статус:
- "Позитивне", якщо рішення ухвалено на користь позивача;
- "Негативне", якщо у задоволенні вимог відмовлено;
- "Часткове", якщо вимоги задоволено частково;
- "Невідоме", якщо статус визначити неможливо.

Правила:
- не вигадуй суми, якщо суми немає, поверни null;
- суми повертай числом у гривнях з крапкою як десятковим роздільником, без тексту;
- дату повертай у форматі yyyy-mm-dd або null.

Текст:
{input}

Відповідай лише валідним JSON без пояснень:
{
  "status": "Позитивне | Негативне | Часткове | Невідоме",
  "main_amount_uah": 12345.67,
  "court_fee_uah": 123.45,
  "legal_aid_uah": 1000.00,
  "decision_date": "2025-12-02"
}"#,
);

pub const EXECUTION_DOC_EXTRACT: PromptTemplate = PromptTemplate::new(
    "execution_doc_extract",
    r#"Знайди у тексті виконавчого документа фрагменти, що містять:
1) основну суму стягнення (як правило, заборгованість за кредитним договором);
2) судовий збір або судові витрати;
3) витрати на правничу допомогу;
4) дату видачі виконавчого листа.

Поверни 8-20 найважливіших речень без пояснень.

Документ:
{input}"#,
);

pub const EXECUTION_DOC_CLASSIFY: PromptTemplate = PromptTemplate::new(
    "execution_doc_classify",
    r#"За фрагментами визнач:
1) main_amount_uah: основна сума стягнення;
2) court_fee_uah: судовий збір або судові витрати;
3) legal_aid_uah: витрати на правничу допомогу;
4) execution_doc_issue_date: дата видачі виконавчого документа.

Правила:
- не вигадуй значення, якщо поля немає, поверни null;
- суми повертай числом у гривнях з крапкою як десятковим роздільником, без тексту;
- дату повертай у форматі yyyy-mm-dd або null;
- для execution_doc_issue_date бери дату з фрази про видачу ("Виконавчий лист видано",
  "Дата видачі виконавчого листа"), а не дату рішення.

Текст:
{input}

Відповідай лише валідним JSON:
{
  "main_amount_uah": 12345.67,
  "court_fee_uah": 123.45,
  "legal_aid_uah": 1000.00,
  "execution_doc_issue_date": "2026-02-03"
}"#,
);
