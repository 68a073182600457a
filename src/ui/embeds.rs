use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎶 Vibe Queue";

/// Crea un embed con imagen y caption para anuncios de reproducción
pub fn create_media_embed(image_url: &str, caption: &str) -> CreateEmbed {
    CreateEmbed::default()
        .description(caption)
        .color(colors::MUSIC_PURPLE)
        .thumbnail(image_url)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}
