//! Locale table for user-facing messages.
//!
//! Texts are resolved with an exhaustive `match`, so adding a [`Locale`] or a
//! [`MessageKey`] without translating it does not compile.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A supported interface language.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    /// English.
    #[default]
    En,
    /// Russian.
    Ru,
    /// Polish.
    Pl,
    /// Kyrgyz.
    Ky,
    /// Uzbek.
    Uz,
}

impl Locale {
    /// All locales in keyboard order.
    pub const ALL: [Self; 5] = [Self::En, Self::Ru, Self::Pl, Self::Ky, Self::Uz];

    /// Short locale code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ru => "ru",
            Self::Pl => "pl",
            Self::Ky => "ky",
            Self::Uz => "uz",
        }
    }

    /// Label shown on the language keyboard.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::En => "English",
            Self::Ru => "Русский",
            Self::Pl => "Polski",
            Self::Ky => "Кыргызча",
            Self::Uz => "Oʻzbekcha",
        }
    }

    /// Resolve a locale code, falling back to the default locale.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|l| l.code().eq_ignore_ascii_case(code.trim()))
            .unwrap_or_default()
    }

    /// Match an exact keyboard label.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL.into_iter().find(|l| l.label() == label)
    }

    /// Labels for the language keyboard.
    #[must_use]
    pub fn labels() -> Vec<String> {
        Self::ALL.iter().map(|l| l.label().to_string()).collect()
    }

    /// Localized text for `key`.
    #[must_use]
    pub const fn text(self, key: MessageKey) -> &'static str {
        match self {
            Self::En => en(key),
            Self::Ru => ru(key),
            Self::Pl => pl(key),
            Self::Ky => ky(key),
            Self::Uz => uz(key),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Identifier of a user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageKey {
    /// Language selection prompt.
    Start,
    /// Ask for images after the language is chosen.
    AskImages,
    /// Acknowledge one image.
    ImageReceived,
    /// Finish with an empty batch.
    NoImages,
    /// Assembly started.
    Converting,
    /// Document ready, ask whether to rename.
    PdfReady,
    /// Ask for the new file name.
    AskRename,
    /// Closing message.
    ThankYou,
    /// Rejected file name.
    InvalidName,
    /// Event arrived before a language was selected.
    SelectLanguage,
    /// Downloading an image failed.
    FetchFailed,
    /// An image could not be read and was dropped from the batch.
    BadImage,
    /// Assembly failed or timed out.
    ConversionFailed,
    /// Sending the document failed.
    DeliveryFailed,
    /// Batch limit reached.
    TooManyImages,
}

const fn en(key: MessageKey) -> &'static str {
    match key {
        MessageKey::Start => "Please choose your language:",
        MessageKey::AskImages => {
            "Now, send the images you want to convert to PDF. When finished, type \"Finish\"."
        }
        MessageKey::ImageReceived => "Image received. Send more or type \"Finish\" when done.",
        MessageKey::NoImages => "No images received. Please send images first.",
        MessageKey::Converting => "Converting images to PDF...",
        MessageKey::PdfReady => "PDF is ready. Do you want to rename it?",
        MessageKey::AskRename => "Please send the new file name (without extension).",
        MessageKey::ThankYou => {
            "Thank you for using the bot! Type /start to begin a new conversion."
        }
        MessageKey::InvalidName => "Invalid file name or file already exists. Please try again.",
        MessageKey::SelectLanguage => "Please select a language first. Type /start to begin.",
        MessageKey::FetchFailed => {
            "Could not download one of the images. Type \"Finish\" to retry or /start to begin again."
        }
        MessageKey::BadImage => {
            "One of the images could not be read (only JPEG and PNG are supported) and was removed. Send more images or type \"Finish\"."
        }
        MessageKey::ConversionFailed => {
            "Something went wrong while creating the PDF. Type \"Finish\" to retry or /start to begin again."
        }
        MessageKey::DeliveryFailed => "Sorry, the PDF could not be sent.",
        MessageKey::TooManyImages => {
            "You have reached the maximum number of images. Type \"Finish\" to create the PDF."
        }
    }
}

const fn ru(key: MessageKey) -> &'static str {
    match key {
        MessageKey::Start => "Пожалуйста, выберите язык:",
        MessageKey::AskImages => {
            "Теперь отправьте изображения, которые вы хотите конвертировать в PDF. Когда закончите, напишите \"Finish\"."
        }
        MessageKey::ImageReceived => {
            "Изображение получено. Отправьте еще или напишите \"Finish\", когда закончите."
        }
        MessageKey::NoImages => "Изображений не получено. Пожалуйста, отправьте изображения.",
        MessageKey::Converting => "Конвертируем изображения в PDF...",
        MessageKey::PdfReady => "PDF готов. Хотите изменить имя файла?",
        MessageKey::AskRename => "Пожалуйста, отправьте новое имя файла (без расширения).",
        MessageKey::ThankYou => {
            "Спасибо за использование бота! Напишите /start, чтобы начать новое преобразование."
        }
        MessageKey::InvalidName => {
            "Недопустимое имя файла или файл с таким именем уже существует. Пожалуйста, попробуйте снова."
        }
        MessageKey::SelectLanguage => {
            "Сначала выберите язык. Напишите /start, чтобы начать."
        }
        MessageKey::FetchFailed => {
            "Не удалось загрузить одно из изображений. Напишите \"Finish\", чтобы повторить, или /start, чтобы начать заново."
        }
        MessageKey::BadImage => {
            "Одно из изображений не удалось прочитать (поддерживаются только JPEG и PNG), оно удалено. Отправьте еще изображения или напишите \"Finish\"."
        }
        MessageKey::ConversionFailed => {
            "Не удалось создать PDF. Напишите \"Finish\", чтобы повторить, или /start, чтобы начать заново."
        }
        MessageKey::DeliveryFailed => "К сожалению, не удалось отправить PDF.",
        MessageKey::TooManyImages => {
            "Достигнуто максимальное количество изображений. Напишите \"Finish\", чтобы создать PDF."
        }
    }
}

const fn pl(key: MessageKey) -> &'static str {
    match key {
        MessageKey::Start => "Wybierz język:",
        MessageKey::AskImages => {
            "Wyślij teraz obrazy, które chcesz przekonwertować na PDF. Po zakończeniu napisz \"Finish\"."
        }
        MessageKey::ImageReceived => {
            "Obrazek odebrany. Wyślij więcej lub napisz \"Finish\", gdy skończysz."
        }
        MessageKey::NoImages => "Nie otrzymano obrazów. Proszę wyślij obrazy.",
        MessageKey::Converting => "Konwertuję obrazy na PDF...",
        MessageKey::PdfReady => "PDF jest gotowy. Chcesz zmienić nazwę pliku?",
        MessageKey::AskRename => "Proszę podać nową nazwę pliku (bez rozszerzenia).",
        MessageKey::ThankYou => {
            "Dziękujemy za skorzystanie z bota! Napisz /start, aby rozpocząć nowe konwertowanie."
        }
        MessageKey::InvalidName => {
            "Nieprawidłowa nazwa pliku lub plik o tej nazwie już istnieje. Spróbuj ponownie."
        }
        MessageKey::SelectLanguage => "Najpierw wybierz język. Napisz /start, aby rozpocząć.",
        MessageKey::FetchFailed => {
            "Nie udało się pobrać jednego z obrazów. Napisz \"Finish\", aby spróbować ponownie, lub /start, aby zacząć od nowa."
        }
        MessageKey::BadImage => {
            "Jednego z obrazów nie udało się odczytać (obsługiwane są tylko JPEG i PNG) i został usunięty. Wyślij więcej obrazów lub napisz \"Finish\"."
        }
        MessageKey::ConversionFailed => {
            "Nie udało się utworzyć pliku PDF. Napisz \"Finish\", aby spróbować ponownie, lub /start, aby zacząć od nowa."
        }
        MessageKey::DeliveryFailed => "Niestety nie udało się wysłać pliku PDF.",
        MessageKey::TooManyImages => {
            "Osiągnięto maksymalną liczbę obrazów. Napisz \"Finish\", aby utworzyć PDF."
        }
    }
}

const fn ky(key: MessageKey) -> &'static str {
    match key {
        MessageKey::Start => "Тилди тандаңыз:",
        MessageKey::AskImages => {
            "Эми PDFке айландырууну каалаган сүрөттөрдү жибериңиз. Аяктаган соң \"Finish\" деп жазыңыз."
        }
        MessageKey::ImageReceived => {
            "Сүрөт алынган. Көбүрөөк жиберүү же \"Finish\" деп жазып бүткөнүңүздү билдирүү."
        }
        MessageKey::NoImages => "Сүрөттөр алынган жок. Сураныч, сүрөттөрдү жибериңиз.",
        MessageKey::Converting => "Сүрөттөрдү PDFке айландыруу...",
        MessageKey::PdfReady => "PDF даяр. Файлдын атын өзгөртүшүңүз керекпи?",
        MessageKey::AskRename => "Жаңы файл атын жибериңиз (кошумча жок).",
        MessageKey::ThankYou => {
            "Ботту колдонгонуңуз үчүн рахмат! /start деп жазып, жаңы конвертация баштаңыз."
        }
        MessageKey::InvalidName => {
            "Жаңы файл аты туура эмес же ушундай аттагы файл бар. Сураныч, кайрадан аракет кылып көрүңүз."
        }
        MessageKey::SelectLanguage => "Адегенде тилди тандаңыз. Баштоо үчүн /start деп жазыңыз.",
        MessageKey::FetchFailed => {
            "Сүрөттөрдүн бирин жүктөө мүмкүн болгон жок. Кайталоо үчүн \"Finish\" же кайра баштоо үчүн /start деп жазыңыз."
        }
        MessageKey::BadImage => {
            "Сүрөттөрдүн бирин окуу мүмкүн болгон жок (JPEG жана PNG гана колдоого алынат), ал өчүрүлдү. Дагы сүрөт жибериңиз же \"Finish\" деп жазыңыз."
        }
        MessageKey::ConversionFailed => {
            "PDF түзүүдө ката кетти. Кайталоо үчүн \"Finish\" же кайра баштоо үчүн /start деп жазыңыз."
        }
        MessageKey::DeliveryFailed => "Тилекке каршы, PDF жөнөтүлгөн жок.",
        MessageKey::TooManyImages => {
            "Сүрөттөрдүн эң көп санына жеттиңиз. PDF түзүү үчүн \"Finish\" деп жазыңыз."
        }
    }
}

const fn uz(key: MessageKey) -> &'static str {
    match key {
        MessageKey::Start => "Iltimos, tilni tanlang:",
        MessageKey::AskImages => {
            "Endi PDFga aylantirmoqchi bo'lgan rasmlaringizni yuboring. Tugatganingizda \"Finish\" deb yozing."
        }
        MessageKey::ImageReceived => {
            "Rasm olindi. Ko'proq yuboring yoki tugatganingizni \"Finish\" deb yozing."
        }
        MessageKey::NoImages => "Rasmlar olinmadi. Iltimos, rasmlarni yuboring.",
        MessageKey::Converting => "Rasmlarni PDFga aylantirmoqda...",
        MessageKey::PdfReady => "PDF tayyor. Fayl nomini o'zgartirmoqchimisiz?",
        MessageKey::AskRename => "Yangi fayl nomini yuboring (kengaytmasiz).",
        MessageKey::ThankYou => {
            "Botdan foydalanishingiz uchun rahmat! Yangi konvertatsiya boshlash uchun /start deb yozing."
        }
        MessageKey::InvalidName => {
            "Noto'g'ri fayl nomi yoki bunday nomdagi fayl allaqachon mavjud. Iltimos, yana urinib ko'ring."
        }
        MessageKey::SelectLanguage => {
            "Avval tilni tanlang. Boshlash uchun /start deb yozing."
        }
        MessageKey::FetchFailed => {
            "Rasmlardan birini yuklab bo'lmadi. Qayta urinish uchun \"Finish\" yoki qaytadan boshlash uchun /start deb yozing."
        }
        MessageKey::BadImage => {
            "Rasmlardan birini o'qib bo'lmadi (faqat JPEG va PNG qo'llab-quvvatlanadi) va u o'chirildi. Yana rasm yuboring yoki \"Finish\" deb yozing."
        }
        MessageKey::ConversionFailed => {
            "PDF yaratishda xatolik yuz berdi. Qayta urinish uchun \"Finish\" yoki qaytadan boshlash uchun /start deb yozing."
        }
        MessageKey::DeliveryFailed => "Kechirasiz, PDF yuborib bo'lmadi.",
        MessageKey::TooManyImages => {
            "Rasmlarning maksimal soniga yetdingiz. PDF yaratish uchun \"Finish\" deb yozing."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_fallback() {
        assert_eq!(Locale::from_code("ru"), Locale::Ru);
        assert_eq!(Locale::from_code(" PL "), Locale::Pl);
        assert_eq!(Locale::from_code("de"), Locale::En);
    }

    #[test]
    fn test_label_lookup() {
        assert_eq!(Locale::from_label("English"), Some(Locale::En));
        assert_eq!(Locale::from_label("Кыргызча"), Some(Locale::Ky));
        assert_eq!(Locale::from_label("english"), None);
        assert_eq!(Locale::labels().len(), Locale::ALL.len());
    }

    #[test]
    fn test_reference_texts() {
        assert_eq!(
            Locale::En.text(MessageKey::Converting),
            "Converting images to PDF..."
        );
        assert_eq!(Locale::Pl.text(MessageKey::Start), "Wybierz język:");
    }

    #[test]
    fn test_every_locale_mentions_finish_where_expected() {
        for locale in Locale::ALL {
            assert!(locale.text(MessageKey::AskImages).contains("Finish"));
            assert!(locale.text(MessageKey::ThankYou).contains("/start"));
        }
    }
}
